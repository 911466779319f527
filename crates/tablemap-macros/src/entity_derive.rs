//! Implementation of the Entity derive macro.
//!
//! Parses `#[tablemap(...)]` attributes into an [`EntityDef`] and generates an
//! `Entity` implementation whose `table()` builds the `Table` once.

use convert_case::{Case, Casing};
use proc_macro2::{Span, TokenStream};
use quote::{ToTokens, quote};
use syn::{
    Data, DeriveInput, Error, Field, Fields, GenericArgument, Ident, LitStr, Path, PathArguments,
    Result, Type,
};

const HOOK_NAMES: [&str; 9] = [
    "before_scan",
    "after_scan",
    "after_select",
    "before_insert",
    "after_insert",
    "before_update",
    "after_update",
    "before_delete",
    "after_delete",
];

/// Parsed definition of a struct with `#[derive(Entity)]`.
#[derive(Debug)]
pub struct EntityDef {
    /// The struct name.
    pub name: Ident,
    /// SQL table name.
    pub table: String,
    /// Model alias.
    pub alias: String,
    /// Declared hooks (snake-case names); `None` when the attribute is absent.
    pub hooks: Option<Vec<Ident>>,
    /// Mapped columns.
    pub columns: Vec<ColumnDef>,
    /// Declared relations.
    pub relations: Vec<RelationDef>,
}

/// A field mapped to a column.
#[derive(Debug)]
pub struct ColumnDef {
    pub field: Ident,
    pub ty: Type,
    pub column: String,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub nullable: bool,
    pub scan_with: Option<Path>,
    pub append_with: Option<Path>,
}

/// Storage shape of a relation field.
#[derive(Debug)]
pub enum SlotShape {
    /// `Option<Box<T>>`
    OptionBox(Type),
    /// `Option<T>`
    Option(Type),
    /// `Box<T>`
    Boxed(Type),
    /// `Vec<T>`
    Vec(Type),
    /// `T`
    Plain(Type),
}

impl SlotShape {
    fn target(&self) -> &Type {
        match self {
            SlotShape::OptionBox(t)
            | SlotShape::Option(t)
            | SlotShape::Boxed(t)
            | SlotShape::Vec(t)
            | SlotShape::Plain(t) => t,
        }
    }
}

/// A field declared as a relation.
#[derive(Debug)]
pub struct RelationDef {
    pub field: Ident,
    pub kind: &'static str,
    pub alias: String,
    pub join: Vec<(String, String)>,
    pub link: Option<(String, String, String)>,
    pub shape: SlotShape,
}

#[derive(Default)]
struct FieldAttrs {
    primary_key: bool,
    auto_increment: bool,
    nullable: Option<bool>,
    column: Option<String>,
    skip: bool,
    scan_with: Option<Path>,
    append_with: Option<Path>,
    rel: Option<LitStr>,
    join: Option<LitStr>,
    alias: Option<String>,
    link: Option<String>,
    link_remote: Option<String>,
}

/// Parse a `DeriveInput` into an `EntityDef`.
pub fn parse_entity(input: &DeriveInput) -> Result<EntityDef> {
    let name = input.ident.clone();

    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.generics,
            "Entity cannot be derived for generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => named.named.iter().collect::<Vec<_>>(),
            Fields::Unnamed(_) => {
                return Err(Error::new_spanned(
                    &data.fields,
                    "Entity requires a struct with named fields",
                ));
            }
            Fields::Unit => Vec::new(),
        },
        Data::Enum(_) => {
            return Err(Error::new_spanned(
                input,
                "Entity can only be derived for structs, not enums",
            ));
        }
        Data::Union(_) => {
            return Err(Error::new_spanned(
                input,
                "Entity can only be derived for structs, not unions",
            ));
        }
    };

    let mut table = None;
    let mut alias = None;
    let mut hooks = None;

    for attr in &input.attrs {
        if !attr.path().is_ident("tablemap") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value: LitStr = meta.value()?.parse()?;
                table = Some(value.value());
            } else if meta.path.is_ident("alias") {
                let value: LitStr = meta.value()?.parse()?;
                alias = Some(value.value());
            } else if meta.path.is_ident("hooks") {
                let mut list = Vec::new();
                meta.parse_nested_meta(|hook| {
                    let ident = hook
                        .path
                        .get_ident()
                        .cloned()
                        .ok_or_else(|| hook.error("expected a hook name"))?;
                    if !HOOK_NAMES.contains(&ident.to_string().as_str()) {
                        return Err(Error::new_spanned(
                            &ident,
                            format!(
                                "unknown hook `{ident}`. Valid hooks are: {}",
                                HOOK_NAMES.join(", ")
                            ),
                        ));
                    }
                    list.push(ident);
                    Ok(())
                })?;
                hooks = Some(list);
            } else {
                let attr_name = meta.path.to_token_stream().to_string();
                return Err(meta.error(format!(
                    "unknown tablemap attribute `{attr_name}`. \
                     Valid struct attributes are: table, alias, hooks"
                )));
            }
            Ok(())
        })?;
    }

    let alias = alias.unwrap_or_else(|| name.to_string().to_case(Case::Snake));
    let table = table.unwrap_or_else(|| pluralize(&alias));

    let mut columns = Vec::new();
    let mut pending = Vec::new();
    for field in fields {
        let attrs = parse_field_attrs(field)?;
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| Error::new_spanned(field, "expected named field"))?;
        if attrs.skip {
            continue;
        }
        if attrs.rel.is_some() {
            pending.push((ident, field, attrs));
            continue;
        }
        if attrs.join.is_some() || attrs.link.is_some() || attrs.link_remote.is_some() {
            return Err(Error::new_spanned(
                field,
                "`join`, `link` and `link_remote` require `rel`",
            ));
        }
        columns.push(ColumnDef {
            column: attrs.column.unwrap_or_else(|| ident.to_string()),
            nullable: attrs.nullable.unwrap_or_else(|| is_option_type(&field.ty)),
            field: ident,
            ty: field.ty.clone(),
            primary_key: attrs.primary_key,
            auto_increment: attrs.auto_increment,
            scan_with: attrs.scan_with,
            append_with: attrs.append_with,
        });
    }

    let pk = columns
        .iter()
        .find(|c| c.primary_key)
        .map_or_else(|| "id".to_string(), |c| c.column.clone());

    let relations = pending
        .into_iter()
        .map(|(ident, field, attrs)| parse_relation(ident, field, attrs, &alias, &pk))
        .collect::<Result<Vec<_>>>()?;

    Ok(EntityDef {
        name,
        table,
        alias,
        hooks,
        columns,
        relations,
    })
}

fn parse_field_attrs(field: &Field) -> Result<FieldAttrs> {
    let mut attrs = FieldAttrs::default();
    for attr in &field.attrs {
        if !attr.path().is_ident("tablemap") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            let path = &meta.path;
            if path.is_ident("pk") || path.is_ident("primary_key") {
                attrs.primary_key = true;
            } else if path.is_ident("autoincrement") {
                attrs.auto_increment = true;
            } else if path.is_ident("nullable") {
                attrs.nullable = Some(true);
            } else if path.is_ident("skip") {
                attrs.skip = true;
            } else if path.is_ident("column") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.column = Some(value.value());
            } else if path.is_ident("scan_with") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.scan_with = Some(value.parse()?);
            } else if path.is_ident("append_with") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.append_with = Some(value.parse()?);
            } else if path.is_ident("rel") {
                attrs.rel = Some(meta.value()?.parse()?);
            } else if path.is_ident("join") {
                attrs.join = Some(meta.value()?.parse()?);
            } else if path.is_ident("alias") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.alias = Some(value.value());
            } else if path.is_ident("link") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.link = Some(value.value());
            } else if path.is_ident("link_remote") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.link_remote = Some(value.value());
            } else {
                let attr_name = path.to_token_stream().to_string();
                return Err(meta.error(format!(
                    "unknown tablemap attribute `{attr_name}`. \
                     Valid field attributes are: pk, autoincrement, nullable, column, skip, \
                     scan_with, append_with, rel, join, alias, link, link_remote"
                )));
            }
            Ok(())
        })?;
    }
    Ok(attrs)
}

fn parse_relation(
    field: Ident,
    source: &Field,
    attrs: FieldAttrs,
    owner_alias: &str,
    owner_pk: &str,
) -> Result<RelationDef> {
    let Some(rel) = attrs.rel else {
        return Err(Error::new_spanned(source, "expected `rel`"));
    };
    let kind = match rel.value().as_str() {
        "has-one" => "HasOne",
        "belongs-to" => "BelongsTo",
        "has-many" => "HasMany",
        "many-to-many" | "m2m" => "ManyToMany",
        other => {
            return Err(Error::new_spanned(
                &rel,
                format!(
                    "unknown relation kind `{other}`. \
                     Valid kinds are: has-one, belongs-to, has-many, many-to-many"
                ),
            ));
        }
    };
    if attrs.primary_key || attrs.column.is_some() || attrs.scan_with.is_some() {
        return Err(Error::new_spanned(
            source,
            "relation fields cannot carry column attributes",
        ));
    }

    let shape = classify_slot(&source.ty);
    let many = matches!(kind, "HasMany" | "ManyToMany");
    if many != matches!(shape, SlotShape::Vec(_)) {
        return Err(Error::new_spanned(
            &source.ty,
            if many {
                "has-many and many-to-many relations must be declared as `Vec<T>`"
            } else {
                "has-one and belongs-to relations cannot be declared as `Vec<T>`"
            },
        ));
    }

    let name = field.to_string();
    let join = match &attrs.join {
        Some(lit) => parse_join(lit)?,
        None => match kind {
            "HasOne" | "HasMany" => vec![(owner_pk.to_string(), format!("{owner_alias}_{owner_pk}"))],
            "BelongsTo" => vec![(format!("{name}_id"), "id".to_string())],
            _ => {
                return Err(Error::new_spanned(
                    &rel,
                    "many-to-many relations require `join = \"base=link_column\"`",
                ));
            }
        },
    };

    let link = if kind == "ManyToMany" {
        let (Some(table), Some(remote)) = (attrs.link, attrs.link_remote) else {
            return Err(Error::new_spanned(
                &rel,
                "many-to-many relations require `link` and `link_remote`",
            ));
        };
        if join.len() != 1 {
            return Err(Error::new_spanned(
                &rel,
                "many-to-many relations take exactly one join pair",
            ));
        }
        Some((table, join[0].1.clone(), remote))
    } else {
        None
    };

    Ok(RelationDef {
        alias: attrs.alias.unwrap_or_else(|| name.clone()),
        field,
        kind,
        join,
        link,
        shape,
    })
}

/// Parse `"id=user_id, org=org_id"` into column pairs.
fn parse_join(lit: &LitStr) -> Result<Vec<(String, String)>> {
    let value = lit.value();
    let mut pairs = Vec::new();
    for part in value.split(',') {
        let Some((base, join)) = part.split_once('=') else {
            return Err(Error::new_spanned(
                lit,
                format!("join pair `{}` must look like `base=join`", part.trim()),
            ));
        };
        let (base, join) = (base.trim(), join.trim());
        if base.is_empty() || join.is_empty() {
            return Err(Error::new_spanned(lit, "join columns cannot be empty"));
        }
        pairs.push((base.to_string(), join.to_string()));
    }
    Ok(pairs)
}

/// Default table name: the alias in plural form.
fn pluralize(alias: &str) -> String {
    if let Some(stem) = alias.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{stem}ies");
        }
    }
    if alias.ends_with('s') || alias.ends_with('x') || alias.ends_with("ch") || alias.ends_with("sh")
    {
        return format!("{alias}es");
    }
    format!("{alias}s")
}

/// Check if a type is `Option<T>`.
fn is_option_type(ty: &Type) -> bool {
    single_generic(ty, "Option").is_some()
}

/// Extract `T` from `Wrapper<T>` when the last path segment is `wrapper`.
fn single_generic<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            if segment.ident == wrapper {
                if let PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(GenericArgument::Type(inner)) = args.args.first() {
                        return Some(inner);
                    }
                }
            }
        }
    }
    None
}

fn classify_slot(ty: &Type) -> SlotShape {
    if let Some(inner) = single_generic(ty, "Option") {
        return match single_generic(inner, "Box") {
            Some(target) => SlotShape::OptionBox(target.clone()),
            None => SlotShape::Option(inner.clone()),
        };
    }
    if let Some(inner) = single_generic(ty, "Box") {
        return SlotShape::Boxed(inner.clone());
    }
    if let Some(inner) = single_generic(ty, "Vec") {
        return SlotShape::Vec(inner.clone());
    }
    SlotShape::Plain(ty.clone())
}

/// Generate the Entity trait implementation.
pub fn generate_entity_impl(def: &EntityDef) -> TokenStream {
    let name = &def.name;
    let table = &def.table;
    let alias = &def.alias;

    let columns = def.columns.iter().map(|c| generate_column(name, c));
    let relations = def.relations.iter().map(|r| generate_relation(name, r));

    let hook_variants: Vec<Ident> = def
        .hooks
        .iter()
        .flatten()
        .map(|h| Ident::new(&h.to_string().to_case(Case::Pascal), h.span()))
        .collect();

    let hooks_impl = if def.hooks.is_none() {
        quote! {
            impl ::tablemap_core::ModelHooks for #name {}
        }
    } else {
        TokenStream::new()
    };

    quote! {
        #hooks_impl

        impl ::tablemap_core::Entity for #name {
            fn table() -> &'static ::tablemap_core::Table {
                static TABLE: ::std::sync::OnceLock<::tablemap_core::Table> =
                    ::std::sync::OnceLock::new();
                TABLE.get_or_init(|| {
                    ::tablemap_core::Table::builder::<#name>(#table, #alias)
                        #(.column(#columns))*
                        #(.relation(#relations))*
                        .hooks(::tablemap_core::HookSet::from_hooks(&[
                            #(::tablemap_core::Hook::#hook_variants),*
                        ]))
                        .build()
                })
            }
        }
    }
}

fn generate_column(owner: &Ident, column: &ColumnDef) -> TokenStream {
    let field = &column.field;
    let ty = &column.ty;
    let column_name = &column.column;
    let field_name = field.to_string();
    let primary_key = column.primary_key;
    let auto_increment = column.auto_increment;
    let nullable = column.nullable;

    let get = match &column.append_with {
        Some(append) => quote! {
            |inst| ::tablemap_core::field::get_field_with::<#owner, #ty>(inst, |e| &e.#field, #append)
        },
        None => quote! {
            |inst| ::tablemap_core::field::get_field::<#owner, #ty>(inst, |e| &e.#field)
        },
    };
    let set = match &column.scan_with {
        Some(scan) => quote! {
            |inst, raw| ::tablemap_core::field::set_field_with::<#owner, #ty>(
                inst, raw, #column_name, |e| &mut e.#field, #scan,
            )
        },
        None => quote! {
            |inst, raw| ::tablemap_core::field::set_field::<#owner, #ty>(
                inst, raw, #column_name, |e| &mut e.#field,
            )
        },
    };

    quote! {
        ::tablemap_core::Column::new(
            #column_name,
            #field_name,
            ::tablemap_core::FieldAccessor::new(#get, #set),
        )
        .primary_key(#primary_key)
        .auto_increment(#auto_increment)
        .nullable(#nullable)
    }
}

fn generate_relation(owner: &Ident, relation: &RelationDef) -> TokenStream {
    let field = &relation.field;
    let name = field.to_string();
    let alias = &relation.alias;
    let kind = Ident::new(relation.kind, Span::call_site());
    let target = relation.shape.target();

    let slot = match &relation.shape {
        SlotShape::OptionBox(t) => quote! {
            ::tablemap_core::RelationSlot::One(|owner, alloc| {
                ::tablemap_core::relationship::mount_optional_box::<#owner, #t>(owner, alloc, |e| &mut e.#field)
            })
        },
        SlotShape::Option(t) => quote! {
            ::tablemap_core::RelationSlot::One(|owner, alloc| {
                ::tablemap_core::relationship::mount_optional::<#owner, #t>(owner, alloc, |e| &mut e.#field)
            })
        },
        SlotShape::Boxed(t) => quote! {
            ::tablemap_core::RelationSlot::One(|owner, alloc| {
                ::tablemap_core::relationship::mount_boxed::<#owner, #t>(owner, alloc, |e| &mut e.#field)
            })
        },
        SlotShape::Plain(t) => quote! {
            ::tablemap_core::RelationSlot::One(|owner, alloc| {
                ::tablemap_core::relationship::mount_inline::<#owner, #t>(owner, alloc, |e| &mut e.#field)
            })
        },
        SlotShape::Vec(t) => quote! {
            ::tablemap_core::RelationSlot::Many(
                |owner, value| {
                    ::tablemap_core::relationship::push_vec::<#owner, #t>(owner, value, |e| &mut e.#field)
                },
                |owner| ::tablemap_core::relationship::vec_items::<#owner, #t>(owner, |e| &mut e.#field),
            )
        },
    };

    let join = relation.join.iter().map(|(base, join)| quote! { (#base, #join) });
    let link = relation.link.as_ref().map(|(table, local, remote)| {
        quote! {
            .link_table(::tablemap_core::LinkTable::new(#table, #local, #remote))
        }
    });

    quote! {
        ::tablemap_core::Relation::new(
            #name,
            ::tablemap_core::RelationKind::#kind,
            || <#target as ::tablemap_core::Entity>::table(),
            #slot,
        )
        .alias(#alias)
        .join_keys(&[#(#join),*])
        #link
    }
}
