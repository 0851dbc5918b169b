use fxhash::FxHashSet;
use proc_macro2::TokenStream;
use quote::{ToTokens, format_ident, quote};
use syn::{Attribute, Data, DeriveInput, Field, Fields, Ident, Type};

const CONTEXT_TYPES: [&str; 2] =
    ["Option<Cow<'static,str>>", "Option<std::borrow::Cow<'static,str>>"];

/// One variant as the expansion needs it.
struct ErrorVariant<'a> {
    ident: &'a Ident,
    cfg: Vec<&'a Attribute>,
    has_context: bool,
    source: Option<(&'a Ident, &'a Type)>,
}

pub fn expand_derive(input: DeriveInput) -> TokenStream {
    match ErrorEnum::parse(&input) {
        Ok(model) => model.expand(&input),
        Err(err) => err.to_compile_error(),
    }
}

struct ErrorEnum<'a> {
    name: &'a Ident,
    ext: Ident,
    variants: Vec<ErrorVariant<'a>>,
}

impl<'a> ErrorEnum<'a> {
    fn parse(input: &'a DeriveInput) -> syn::Result<Self> {
        let Data::Enum(data) = &input.data else {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "ebus_error can only be applied to enums",
            ));
        };

        let variants = data
            .variants
            .iter()
            .map(|variant| {
                let Fields::Named(fields) = &variant.fields else {
                    return Err(syn::Error::new_spanned(
                        variant,
                        "ebus_error requires named fields for source/context handling",
                    ));
                };

                let mut has_context = false;
                let mut source = None;
                for field in &fields.named {
                    let Some(ident) = &field.ident else { continue };
                    if ident == "context" {
                        check_context_type(&field.ty)?;
                        has_context = true;
                    } else if source.is_none() && is_source(ident, field) {
                        source = Some((ident, &field.ty));
                    }
                }

                if source.is_some() && !has_context {
                    return Err(syn::Error::new_spanned(
                        &variant.ident,
                        "ebus_error requires `context: Option<Cow<'static, str>>` for variants with a source",
                    ));
                }

                Ok(ErrorVariant {
                    ident: &variant.ident,
                    cfg: variant.attrs.iter().filter(|a| a.path().is_ident("cfg")).collect(),
                    has_context,
                    source,
                })
            })
            .collect::<syn::Result<Vec<_>>>()?;

        Ok(Self { name: &input.ident, ext: format_ident!("{}Ext", input.ident), variants })
    }

    fn expand(&self, input: &DeriveInput) -> TokenStream {
        let derives = missing_derives(input);
        let ext_trait = self.ext_trait();
        let accessor = self.accessor();
        let conversions = self.variants.iter().filter_map(|v| self.conversion(v));

        quote! {
            #[allow(non_shorthand_field_patterns)]
            #derives
            #input

            #ext_trait
            #accessor
            #(#conversions)*

            #[allow(dead_code)]
            fn format_context(context: &Option<std::borrow::Cow<'static, str>>) -> std::borrow::Cow<'static, str> {
                context.as_ref().map_or(std::borrow::Cow::Borrowed(""), |c| std::borrow::Cow::Owned(format!(" ({c})")))
            }
        }
    }

    fn context_variants(&self) -> impl Iterator<Item = (&[&'a Attribute], &'a Ident)> + '_ {
        self.variants.iter().filter(|v| v.has_context).map(|v| (v.cfg.as_slice(), v.ident))
    }

    /// `<Name>Ext::context` for `Result<T, Name>`, replacing the attached context.
    fn ext_trait(&self) -> TokenStream {
        let (name, ext) = (self.name, &self.ext);
        let arms = self.context_variants().map(|(cfg, ident)| {
            quote! { #(#cfg)* #name::#ident { context: slot, .. } => *slot = Some(context.into()), }
        });

        quote! {
            pub trait #ext<T> {
                fn context(self, context: impl Into<std::borrow::Cow<'static, str>>) -> Result<T, #name>;
            }

            #[automatically_derived]
            impl<T> #ext<T> for Result<T, #name> {
                #[inline]
                fn context(self, context: impl Into<std::borrow::Cow<'static, str>>) -> Self {
                    self.map_err(|mut err| {
                        #[allow(unreachable_patterns)]
                        match &mut err {
                            #( #arms )*
                            _ => {}
                        }
                        err
                    })
                }
            }
        }
    }

    fn accessor(&self) -> TokenStream {
        let name = self.name;
        let arms = self.context_variants().map(|(cfg, ident)| {
            quote! { #(#cfg)* Self::#ident { context, .. } => context.as_deref(), }
        });

        quote! {
            #[automatically_derived]
            impl #name {
                /// Returns the context attached through the generated `context` adaptor, if any.
                #[must_use]
                #[allow(unreachable_patterns)]
                pub fn context_message(&self) -> Option<&str> {
                    match self {
                        #( #arms )*
                        _ => None,
                    }
                }
            }
        }
    }

    /// `From<Source>` plus `<Name>Ext` for `Result<T, Source>`.
    fn conversion(&self, variant: &ErrorVariant<'_>) -> Option<TokenStream> {
        let (field, ty) = variant.source?;
        let (name, ext, ident, cfg) = (self.name, &self.ext, variant.ident, &variant.cfg);

        Some(quote! {
            #(#cfg)*
            #[automatically_derived]
            impl From<#ty> for #name {
                #[inline]
                fn from(#field: #ty) -> Self { Self::#ident { #field, context: None } }
            }

            #(#cfg)*
            #[automatically_derived]
            impl<T> #ext<T> for std::result::Result<T, #ty> {
                #[inline]
                fn context(self, context: impl Into<std::borrow::Cow<'static, str>>) -> std::result::Result<T, #name> {
                    self.map_err(|#field| #name::#ident { #field, context: Some(context.into()) })
                }
            }
        })
    }
}

fn is_source(ident: &Ident, field: &Field) -> bool {
    ident == "source"
        || field.attrs.iter().any(|a| a.path().is_ident("source") || a.path().is_ident("from"))
}

fn check_context_type(ty: &Type) -> syn::Result<()> {
    let rendered: String =
        ty.to_token_stream().to_string().chars().filter(|c| !c.is_whitespace()).collect();
    if CONTEXT_TYPES.contains(&rendered.as_str()) {
        Ok(())
    } else {
        Err(syn::Error::new_spanned(ty, "context field must be Option<Cow<'static, str>>"))
    }
}

/// `#[derive(Debug, thiserror::Error)]`, minus whatever the enum already derives.
fn missing_derives(input: &DeriveInput) -> TokenStream {
    let mut present = FxHashSet::default();
    for attr in input.attrs.iter().filter(|a| a.path().is_ident("derive")) {
        let _ = attr.parse_nested_meta(|meta| {
            if let Some(last) = meta.path.segments.last() {
                present.insert(last.ident.to_string());
            }
            Ok(())
        });
    }

    let mut derives = Vec::new();
    if !present.contains("Debug") {
        derives.push(quote! { Debug });
    }
    if !present.contains("Error") {
        derives.push(quote! { ::thiserror::Error });
    }
    if derives.is_empty() { quote! {} } else { quote! { #[derive(#(#derives),*)] } }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn expand(input: DeriveInput) -> String {
        expand_derive(input).to_string().chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn rejects_structs() {
        let out = expand(parse_quote! { pub struct NotAnEnum { message: String } });
        assert!(out.contains("compile_error"));
    }

    #[test]
    fn rejects_tuple_variants() {
        let out = expand(parse_quote! {
            pub enum DemoError {
                #[error("IO error: {0}")]
                Io(std::io::Error),
            }
        });
        assert!(out.contains("compile_error"));
        assert!(out.contains("namedfields"));
    }

    #[test]
    fn rejects_source_without_context() {
        let out = expand(parse_quote! {
            pub enum DemoError {
                #[error("IO error: {source}")]
                Io { #[source] source: std::io::Error },
            }
        });
        assert!(out.contains("compile_error"));
        assert!(out.contains("context"));
    }

    #[test]
    fn rejects_wrong_context_type() {
        let out = expand(parse_quote! {
            pub enum DemoError {
                #[error("bad")]
                Bad { message: String, context: Option<String> },
            }
        });
        assert!(out.contains("compile_error"));
        assert!(out.contains("Option<Cow<'static,str>>"));
    }

    #[test]
    fn accepts_fully_qualified_cow() {
        let out = expand(parse_quote! {
            pub enum DemoError {
                #[error("bad")]
                Bad { message: String, context: Option<std::borrow::Cow<'static, str>> },
            }
        });
        assert!(!out.contains("compile_error"));
    }

    #[test]
    fn generates_ext_trait_and_accessor() {
        let out = expand(parse_quote! {
            pub enum BusError {
                #[error("Shutdown{}: {message}", format_context(.context))]
                Shutdown { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
            }
        });
        assert!(out.contains("BusErrorExt"));
        assert!(out.contains("context_message"));
        assert!(out.contains("::thiserror::Error"));
    }

    #[test]
    fn source_variants_get_conversions() {
        let out = expand(parse_quote! {
            #[derive(Debug)]
            pub enum BusError {
                #[error("Config{}: {source}", format_context(.context))]
                Config { source: config::ConfigError, context: Option<Cow<'static, str>> },
            }
        });
        assert_eq!(out.matches("Debug").count(), 1);
        assert!(out.contains("From<config::ConfigError>forBusError"));
        assert!(out.contains("BusErrorExt<T>forstd::result::Result<T,config::ConfigError>"));
    }
}
