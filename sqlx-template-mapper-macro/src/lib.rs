use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    Attribute, FnArg, GenericArgument, Ident, ItemTrait, LitBool, LitInt, LitStr, Pat,
    PathArguments, ReturnType, TraitItem, TraitItemFn, Type, parse_macro_input,
    spanned::Spanned,
};

const STATEMENT_ATTRS: [&str; 4] = ["select", "insert", "update", "delete"];
const OPTIONS_ATTR: &str = "options";

fn type_identifier(ty: &Type) -> String {
    quote!(#ty).to_string()
}

/// Attribute macro turning a trait into a bound mapper.
///
/// Every method without a default body is implemented by a generated
/// `<Trait>Proxy` that forwards the call to
/// `sqlx_template_mapper::binding::MapperProxy::invoke`. The statement a
/// method runs is `namespace.method_name`; it is either registered by hand or
/// declared on the method with one of the statement attributes below.
///
/// # Attributes
///
/// ## `#[mapper(namespace = "...")]`
/// - `namespace`: statement namespace, defaults to the trait name
///
/// ## `#[select("...")]`, `#[insert("...")]`, `#[update("...")]`, `#[delete("...")]` (Optional)
/// Declares the SQL of the method's statement. `#{name}` markers bind
/// parameters, `${name}` placeholders are resolved from configuration
/// variables at registration.
///
/// ## `#[options(...)]` (Optional)
/// - `use_generated_keys`: copy driver generated keys into the parameter
/// - `key_property = "id"`: comma separated properties receiving keys
/// - `key_column = "id"`: comma separated key columns
/// - `timeout = 5`: statement timeout in seconds
/// - `fetch_size = 100`
/// - `statement_type = "PREPARED"`: `STATEMENT`, `PREPARED` or `CALLABLE`
///
/// # Example
/// ```ignore
/// use sqlx_template_mapper::{Error, Value, mapper};
///
/// #[mapper(namespace = "users")]
/// pub trait UserMapper: Send + Sync {
///     #[select("select id, name from users where id = #{id}")]
///     fn find(&self, id: i64) -> Result<Option<Value>, Error>;
///
///     #[insert("insert into users(name) values (#{name})")]
///     #[options(use_generated_keys, key_property = "id")]
///     fn insert(&self, user: &mut Value) -> Result<u64, Error>;
///
///     fn describe(&self) -> String {
///         "users".to_string()
///     }
/// }
/// ```
///
/// # Requirements
/// - methods take `&self` and return `Result<T, E>` where `E: From<sqlx_template_mapper::Error>`
/// - arguments implement `ToValue`, the `T` of the result implements `FromValue`
/// - `&mut` arguments receive the parameter object back (generated keys) through `ToValue::merge_value`
#[proc_macro_attribute]
pub fn mapper(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut namespace: Option<LitStr> = None;
    let namespace_parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("namespace") {
            namespace = Some(meta.value()?.parse()?);
            Ok(())
        } else {
            Err(meta.error("unsupported mapper property"))
        }
    });
    parse_macro_input!(attr with namespace_parser);
    let mut item_trait = parse_macro_input!(item as ItemTrait);

    match expand(namespace, &mut item_trait) {
        Ok(expanded) => expanded.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

struct MapperMethod {
    item: TraitItemFn,
    signature: TokenStream2,
    annotation: TokenStream2,
}

fn expand(namespace: Option<LitStr>, item_trait: &mut ItemTrait) -> syn::Result<TokenStream2> {
    if !item_trait.generics.params.is_empty() {
        return Err(syn::Error::new(
            item_trait.generics.span(),
            "mapper traits cannot be generic",
        ));
    }
    let trait_name = item_trait.ident.clone();
    let namespace = namespace
        .map(|ns| ns.value())
        .unwrap_or_else(|| trait_name.to_string());

    // 收集需要代理的方法, 同时去掉语句属性
    let mut methods = Vec::new();
    for item in item_trait.items.iter_mut() {
        let TraitItem::Fn(method) = item else {
            continue;
        };
        let annotation = take_annotation(&mut method.attrs)?;
        if method.default.is_some() {
            if annotation.is_some() {
                return Err(syn::Error::new(
                    method.sig.ident.span(),
                    "statement attributes are not allowed on methods with a default body",
                ));
            }
            continue;
        }
        let signature = method_signature(method)?;
        methods.push(MapperMethod {
            item: method.clone(),
            signature,
            annotation: annotation.unwrap_or_else(|| quote! { ::std::option::Option::None }),
        });
    }

    let vis = &item_trait.vis;
    let proxy_name = format_ident!("{}Proxy", trait_name);
    let type_name = trait_name.to_string();

    let proxy_methods = methods
        .iter()
        .map(proxy_method)
        .collect::<syn::Result<Vec<_>>>()?;
    let descriptors = methods.iter().map(|m| {
        let signature = &m.signature;
        let annotation = &m.annotation;
        quote! {
            ::sqlx_template_mapper::binding::MethodDescriptor {
                signature: #signature,
                annotation: #annotation,
            }
        }
    });

    Ok(quote! {
        #item_trait

        #[derive(Clone, Debug)]
        #vis struct #proxy_name {
            proxy: ::sqlx_template_mapper::binding::MapperProxy,
        }

        impl #trait_name for #proxy_name {
            #(#proxy_methods)*
        }

        impl ::sqlx_template_mapper::binding::MapperInterface for dyn #trait_name {
            fn descriptor() -> ::sqlx_template_mapper::binding::MapperDescriptor {
                ::sqlx_template_mapper::binding::MapperDescriptor {
                    type_name: #type_name,
                    namespace: #namespace,
                    methods: ::std::vec![#(#descriptors),*],
                }
            }

            fn new_proxy(
                proxy: ::sqlx_template_mapper::binding::MapperProxy,
            ) -> ::std::boxed::Box<Self> {
                ::std::boxed::Box::new(#proxy_name { proxy })
            }
        }
    })
}

/// Removes the statement attributes from a method and returns them as an
/// `Option<StatementAnnotation>` expression.
fn take_annotation(attrs: &mut Vec<Attribute>) -> syn::Result<Option<TokenStream2>> {
    let mut statement: Option<(Ident, LitStr)> = None;
    let mut options = quote! { ::std::default::Default::default() };
    let mut kept = Vec::with_capacity(attrs.len());
    for attr in attrs.drain(..) {
        let path = attr.path();
        if let Some(command) = STATEMENT_ATTRS.iter().find(|name| path.is_ident(name)) {
            if statement.is_some() {
                return Err(syn::Error::new(
                    attr.span(),
                    "a mapper method declares at most one statement",
                ));
            }
            let sql: LitStr = attr.parse_args()?;
            let mut variant = command.to_string();
            variant[..1].make_ascii_uppercase();
            statement = Some((format_ident!("{}", variant), sql));
        } else if path.is_ident(OPTIONS_ATTR) {
            options = parse_options(&attr)?;
        } else {
            kept.push(attr);
        }
    }
    *attrs = kept;
    Ok(statement.map(|(command, sql)| {
        quote! {
            ::std::option::Option::Some(::sqlx_template_mapper::binding::StatementAnnotation {
                command: ::sqlx_template_mapper::mapping::SqlCommandType::#command,
                sql: #sql,
                options: #options,
            })
        }
    }))
}

fn parse_options(attr: &Attribute) -> syn::Result<TokenStream2> {
    let mut use_generated_keys = false;
    let mut key_property = quote! { ::std::option::Option::None };
    let mut key_column = quote! { ::std::option::Option::None };
    let mut timeout = quote! { ::std::option::Option::None };
    let mut fetch_size = quote! { ::std::option::Option::None };
    let mut statement_type = quote! { ::std::option::Option::None };
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("use_generated_keys") {
            use_generated_keys = if meta.input.peek(syn::Token![=]) {
                meta.value()?.parse::<LitBool>()?.value
            } else {
                true
            };
        } else if meta.path.is_ident("key_property") {
            let value: LitStr = meta.value()?.parse()?;
            key_property = quote! { ::std::option::Option::Some(#value) };
        } else if meta.path.is_ident("key_column") {
            let value: LitStr = meta.value()?.parse()?;
            key_column = quote! { ::std::option::Option::Some(#value) };
        } else if meta.path.is_ident("timeout") {
            let value = meta.value()?.parse::<LitInt>()?.base10_parse::<u64>()?;
            timeout = quote! { ::std::option::Option::Some(#value) };
        } else if meta.path.is_ident("fetch_size") {
            let value = meta.value()?.parse::<LitInt>()?.base10_parse::<u32>()?;
            fetch_size = quote! { ::std::option::Option::Some(#value) };
        } else if meta.path.is_ident("statement_type") {
            let value: LitStr = meta.value()?.parse()?;
            statement_type = quote! { ::std::option::Option::Some(#value) };
        } else {
            return Err(meta.error("unsupported mapper option"));
        }
        Ok(())
    })?;
    Ok(quote! {
        ::sqlx_template_mapper::binding::StatementOptions {
            use_generated_keys: #use_generated_keys,
            key_property: #key_property,
            key_column: #key_column,
            timeout_secs: #timeout,
            fetch_size: #fetch_size,
            statement_type: #statement_type,
        }
    })
}

/// `Result<T, _>` → the `T`.
fn result_ok_type(output: &ReturnType) -> Option<&Type> {
    let ReturnType::Type(_, ty) = output else {
        return None;
    };
    let Type::Path(path) = ty.as_ref() else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != "Result" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    }
}

fn return_kind(ok_type: &Type) -> Ident {
    let kind = match ok_type {
        Type::Tuple(tuple) if tuple.elems.is_empty() => "Unit",
        Type::Path(path) => match path.path.segments.last() {
            Some(segment) if segment.ident == "Vec" => "Many",
            Some(segment) if segment.ident == "Option" => "Optional",
            _ => "One",
        },
        _ => "One",
    };
    format_ident!("{}", kind)
}

struct Argument {
    name: Ident,
    ty: Type,
}

fn arguments(method: &TraitItemFn) -> syn::Result<Vec<Argument>> {
    let mut receiver = false;
    let mut out = Vec::new();
    for input in &method.sig.inputs {
        match input {
            FnArg::Receiver(r) if r.reference.is_some() && r.mutability.is_none() => {
                receiver = true
            }
            FnArg::Receiver(r) => {
                return Err(syn::Error::new(r.span(), "mapper methods take `&self`"));
            }
            FnArg::Typed(pat_type) => {
                let Pat::Ident(pat) = pat_type.pat.as_ref() else {
                    return Err(syn::Error::new(
                        pat_type.pat.span(),
                        "mapper method arguments must be plain identifiers",
                    ));
                };
                out.push(Argument {
                    name: pat.ident.clone(),
                    ty: (*pat_type.ty).clone(),
                });
            }
        }
    }
    if !receiver {
        return Err(syn::Error::new(
            method.sig.ident.span(),
            "mapper methods take `&self`",
        ));
    }
    Ok(out)
}

fn method_signature(method: &TraitItemFn) -> syn::Result<TokenStream2> {
    let sig = &method.sig;
    if !sig.generics.params.is_empty() || sig.asyncness.is_some() {
        return Err(syn::Error::new(
            sig.ident.span(),
            "mapper methods cannot be generic or async",
        ));
    }
    let ok_type = result_ok_type(&sig.output).ok_or_else(|| {
        syn::Error::new(sig.output.span(), "mapper methods must return `Result<T, E>`")
    })?;
    let args = arguments(method)?;
    let name = sig.ident.to_string();
    let parameter_names = args.iter().map(|a| a.name.to_string());
    let parameter_types = args.iter().map(|a| type_identifier(&a.ty));
    let return_type = type_identifier(ok_type);
    let kind = return_kind(ok_type);
    Ok(quote! {
        ::sqlx_template_mapper::binding::MethodSignature {
            name: #name,
            parameters: &[#(#parameter_names),*],
            parameter_types: &[#(#parameter_types),*],
            return_type: #return_type,
            returns: ::sqlx_template_mapper::binding::ReturnKind::#kind,
        }
    })
}

fn proxy_method(method: &MapperMethod) -> syn::Result<TokenStream2> {
    let sig = &method.item.sig;
    let signature = &method.signature;
    let args = arguments(&method.item)?;
    let names = args.iter().map(|a| &a.name);
    // &mut 参数需要写回
    let write_back = args.iter().enumerate().filter_map(|(i, a)| match &a.ty {
        Type::Reference(r) if r.mutability.is_some() => {
            let name = &a.name;
            Some(quote! {
                ::sqlx_template_mapper::ToValue::merge_value(&mut *#name, &__args[#i])?;
            })
        }
        _ => None,
    });
    Ok(quote! {
        #sig {
            const __SIGNATURE: ::sqlx_template_mapper::binding::MethodSignature = #signature;
            let mut __args: ::std::vec::Vec<::sqlx_template_mapper::Value> =
                ::std::vec![#(::sqlx_template_mapper::ToValue::to_value(&#names)),*];
            let __result = self.proxy.invoke(&__SIGNATURE, &mut __args)?;
            #(#write_back)*
            ::std::result::Result::Ok(::sqlx_template_mapper::FromValue::from_value(__result)?)
        }
    })
}
