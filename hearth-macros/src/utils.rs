use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

/// Splits a `TokenStream` into comma-separated arguments.
///
/// Each argument is returned as a `Vec<TokenTree>`.
/// Commas at the top level are used as separators; commas inside groups
/// belong to the group's single token.
pub(crate) fn split_args(input: TokenStream) -> Vec<Vec<TokenTree>> {
    let mut args = Vec::new();
    let mut current = Vec::new();

    for token in input {
        match &token {
            TokenTree::Punct(p) if p.as_char() == ',' => {
                if !current.is_empty() {
                    args.push(current);
                    current = Vec::new();
                }
            }
            _ => current.push(token),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Converts a slice of tokens into a Rust source string.
///
/// This function preserves token order and inserts spaces
/// between consecutive identifiers to avoid accidental
/// token merging (e.g. `foo bar` vs `foobar`).
pub(crate) fn tokens_to_string(tokens: &[TokenTree]) -> String {
    let mut out = String::new();
    let mut prev_was_ident = false;

    for t in tokens {
        let s = t.to_string();

        let needs_space = prev_was_ident && matches!(t, TokenTree::Ident(_));

        if needs_space {
            out.push(' ');
        }

        out.push_str(&s);
        prev_was_ident = matches!(t, TokenTree::Ident(_));
    }

    out
}

/// Removes the `async` keyword of the annotated function.
///
/// Returns `false` if the function is not `async`.
pub(crate) fn strip_async(tokens: &mut Vec<TokenTree>) -> bool {
    match tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "async"))
    {
        Some(pos) => {
            tokens.remove(pos);
            true
        }
        None => false,
    }
}

/// Replaces the body of the annotated function.
///
/// `wrap` receives the source of the original body and returns the source
/// of the new one, braces excluded.
pub(crate) fn replace_body(
    tokens: &mut [TokenTree],
    wrap: impl FnOnce(String) -> String,
) -> Result<(), String> {
    let pos = tokens
        .iter()
        .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace))
        .ok_or_else(|| String::from("expected a function body"))?;

    let TokenTree::Group(body) = &tokens[pos] else {
        return Err(String::from("expected a function body"));
    };

    let stream = wrap(body.stream().to_string())
        .parse::<TokenStream>()
        .map_err(|err| err.to_string())?;

    tokens[pos] = TokenTree::Group(Group::new(Delimiter::Brace, stream));
    Ok(())
}

/// Builds a `compile_error!` invocation reporting `message`.
pub(crate) fn compile_error(message: &str) -> TokenStream {
    format!("compile_error!({message:?});")
        .parse()
        .unwrap_or_default()
}
