mod utils;

use proc_macro::{TokenStream, TokenTree};

/// Runs an `async fn main` on a fresh event loop with `hearth::run`.
///
/// Accepts an optional `debug = true` (or `false`) argument forcing the
/// loop's debug mode.
///
/// ```rust,ignore
/// #[hearth::main(debug = true)]
/// async fn main() {
///     hearth::yield_now().await.ok();
/// }
/// ```
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut debug: Option<bool> = None;

    for arg in utils::split_args(attr) {
        let arg = utils::tokens_to_string(&arg);

        let Some(value) = arg.strip_prefix("debug") else {
            return utils::compile_error(&format!("unknown argument `{arg}`"));
        };

        match value.trim_start_matches('=').trim() {
            "true" => debug = Some(true),
            "false" => debug = Some(false),
            other => {
                return utils::compile_error(&format!(
                    "`debug` expects `true` or `false`, got `{other}`"
                ));
            }
        }
    }

    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    if !utils::strip_async(&mut tokens) {
        return utils::compile_error("the `async` keyword is missing from the function");
    }

    let debug = match debug {
        Some(enabled) => format!("::core::option::Option::Some({enabled})"),
        None => String::from("::core::option::Option::None"),
    };

    let replaced = utils::replace_body(&mut tokens, |block| {
        format!(
            "::hearth::run_with(async move {{ {block} }}, {debug})
                .expect(\"hearth::main: the event loop failed\")"
        )
    });

    match replaced {
        Ok(()) => tokens.into_iter().collect(),
        Err(err) => utils::compile_error(&format!("hearth::main: {err}")),
    }
}

/// Runs an `async fn` test on a fresh event loop with `hearth::run`.
///
/// ```rust,ignore
/// #[hearth::test]
/// async fn sleeps() {
///     hearth::time::sleep(Duration::from_millis(1)).await.unwrap();
/// }
/// ```
#[proc_macro_attribute]
pub fn test(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut tokens = item.into_iter().collect::<Vec<_>>();

    if !utils::strip_async(&mut tokens) {
        return utils::compile_error("the `async` keyword is missing from the test function");
    }

    let replaced = utils::replace_body(&mut tokens, |block| {
        format!(
            "::hearth::run(async move {{ {block} }})
                .expect(\"hearth::test: the event loop failed\")"
        )
    });

    if let Err(err) = replaced {
        return utils::compile_error(&format!("hearth::test: {err}"));
    }

    let test_attr: TokenStream = "#[test]".parse().unwrap_or_default();
    let mut result: Vec<TokenTree> = test_attr.into_iter().collect();
    result.extend(tokens);

    result.into_iter().collect()
}
