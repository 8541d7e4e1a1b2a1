use proc_macro::TokenStream;
use quote::quote;
use syn::parse::Parser;
use syn::{parse_macro_input, ItemFn, LitBool, LitInt, LitStr};

#[derive(Clone, Copy)]
enum Format {
    Table,
    Json,
    JsonPretty,
}

impl Format {
    fn to_tokens(self) -> proc_macro2::TokenStream {
        match self {
            Format::Table => quote!(fragtrack::Format::Table),
            Format::Json => quote!(fragtrack::Format::Json),
            Format::JsonPretty => quote!(fragtrack::Format::JsonPretty),
        }
    }
}

/// Tracks every heap allocation of the program and prints a fragmentation
/// report when the annotated function returns.
///
/// Installs `fragtrack::TrackingAllocator` as the global allocator next to
/// the function, unless `global_allocator = false` is given (for programs
/// that install their own).
///
/// The report is taken after the function body has finished, so its locals
/// are already freed and it shows what is still live at exit: statics,
/// leaked blocks and runtime buffers. Use `fragtrack::global().stats()`
/// inside the body for the working set.
///
/// # Parameters
///
/// * `format` - `"table"` (default), `"json"` or `"json-pretty"`
/// * `limit` - number of largest live blocks listed in the report (default `0`)
/// * `global_allocator` - whether to install the tracking allocator (default `true`)
///
/// # Examples
///
/// ```rust,ignore
/// #[fragtrack::main(limit = 5)]
/// fn main() {
///     let buffers: Vec<Vec<u8>> = (0..10).map(|i| vec![0; 64 << i]).collect();
///     drop(buffers);
/// }
/// ```
///
/// Works with async entry points too, as long as it sits above the runtime
/// attribute:
///
/// ```rust,ignore
/// #[fragtrack::main(format = "json")]
/// #[tokio::main]
/// async fn main() {}
/// ```
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;

    // Defaults
    let mut format = Format::Table;
    let mut limit: usize = 0;
    let mut global_allocator = true;

    // Parse named args like: format="..", limit=N
    if !attr.is_empty() {
        let parser = syn::meta::parser(|meta| {
            if meta.path.is_ident("format") {
                meta.input.parse::<syn::Token![=]>()?;
                let lit: LitStr = meta.input.parse()?;
                format =
                    match lit.value().as_str() {
                        "table" => Format::Table,
                        "json" => Format::Json,
                        "json-pretty" => Format::JsonPretty,
                        other => return Err(meta.error(format!(
                            "Unknown format {:?}. Expected one of: \"table\", \"json\", \"json-pretty\"",
                            other
                        ))),
                    };
                return Ok(());
            }

            if meta.path.is_ident("limit") {
                meta.input.parse::<syn::Token![=]>()?;
                let li: LitInt = meta.input.parse()?;
                limit = li.base10_parse()?;
                return Ok(());
            }

            if meta.path.is_ident("global_allocator") {
                meta.input.parse::<syn::Token![=]>()?;
                let lit: LitBool = meta.input.parse()?;
                global_allocator = lit.value;
                return Ok(());
            }

            Err(meta.error(
                "Unknown parameter. Supported: format=\"..\", limit=N, global_allocator=bool",
            ))
        });

        if let Err(e) = parser.parse2(proc_macro2::TokenStream::from(attr)) {
            return e.to_compile_error().into();
        }
    }

    let format_token = format.to_tokens();
    let fn_name = &sig.ident;

    let guard_init = quote! {
        let _fragtrack = {
            let caller_name: &'static str =
                concat!(module_path!(), "::", stringify!(#fn_name));

            fragtrack::ReportGuardBuilder::new(caller_name)
                .limit(#limit)
                .format(#format_token)
                .build()
        };
    };

    let body = quote! {
        #guard_init
        #block
    };

    let wrapped_body = if sig.asyncness.is_some() {
        quote! { async { #body }.await }
    } else {
        body
    };

    let allocator = if global_allocator {
        quote! {
            #[global_allocator]
            static FRAGTRACK_GLOBAL_ALLOCATOR: fragtrack::TrackingAllocator =
                fragtrack::TrackingAllocator::system();
        }
    } else {
        quote! {}
    };

    let output = quote! {
        #allocator

        #(#attrs)*
        #vis #sig {
            #wrapped_body
        }
    };

    output.into()
}
