//! Annotation inference: a static type annotation → [`TypeDescriptor`].
//!
//! References to interfaces and aliases declared in the same module are
//! resolved depth-first. A name being resolved is marked in progress; a
//! reference back to it is a cycle and resolves to `any`.

use exemplar_types::annotation::{
    AnnotatedModule, AnnotationKind, InterfaceDecl, Keyword, PropertySignature, TypeAliasDecl,
    TypeAnnotation,
};
use exemplar_types::{TypeDescriptor, TypeKind};
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Generic wrappers whose single argument is the type itself.
const PASSTHROUGH: &[&str] = &["Promise", "Readonly", "Partial", "Required", "Awaited"];

/// Generic wrappers of a list of their single argument.
const LIST_WRAPPERS: &[&str] = &["Array", "ReadonlyArray", "Set", "ReadonlySet"];

/// Generic wrappers keyed by their first argument.
const MAP_WRAPPERS: &[&str] = &["Record", "Map", "ReadonlyMap"];

pub struct AnnotationResolver<'a> {
    interfaces: HashMap<&'a str, &'a InterfaceDecl>,
    aliases: HashMap<&'a str, &'a TypeAliasDecl>,
    in_progress: HashSet<String>,
    /// Type parameters of the declaration being resolved.
    type_params: BTreeSet<String>,
}

impl<'a> AnnotationResolver<'a> {
    pub fn new(module: &'a AnnotatedModule) -> Self {
        Self {
            interfaces: module.interfaces.iter().map(|i| (i.name.name.as_str(), i)).collect(),
            aliases: module.aliases.iter().map(|a| (a.name.name.as_str(), a)).collect(),
            in_progress: HashSet::new(),
            type_params: BTreeSet::new(),
        }
    }

    /// Resolve with `params` in scope as type parameters.
    pub fn with_type_params(&mut self, params: &[String]) -> &mut Self {
        self.type_params = params.iter().cloned().collect();
        self
    }

    pub fn resolve(&mut self, annotation: &TypeAnnotation) -> TypeDescriptor {
        match &annotation.kind {
            AnnotationKind::Keyword(keyword) => keyword_descriptor(*keyword),
            AnnotationKind::StringLiteral(_) => TypeDescriptor::string(),
            AnnotationKind::NumberLiteral(_) => TypeDescriptor::number(),
            AnnotationKind::BoolLiteral(_) => TypeDescriptor::boolean(),
            AnnotationKind::Array(items) => TypeDescriptor::array(self.resolve(items)),
            AnnotationKind::Tuple(items) => {
                let members: Vec<TypeDescriptor> = items.iter().map(|i| self.resolve(i)).collect();
                if members.is_empty() {
                    TypeDescriptor::array(TypeDescriptor::any())
                } else {
                    TypeDescriptor::array(TypeDescriptor::union(members))
                }
            }
            AnnotationKind::Object(props) => TypeDescriptor::object(self.shape(props)),
            AnnotationKind::Union(members) => {
                let members = members.iter().map(|m| self.resolve(m)).collect();
                TypeDescriptor::union(members)
            }
            AnnotationKind::Intersection(parts) => {
                let parts = parts.iter().map(|p| self.resolve(p)).collect();
                TypeDescriptor::intersect(parts)
            }
            AnnotationKind::Reference { name, args } => self.reference(name, args),
            AnnotationKind::Paren(inner) => self.resolve(inner),
            AnnotationKind::Function { .. } | AnnotationKind::Typeof(_) => TypeDescriptor::any(),
        }
    }

    fn shape(&mut self, props: &[PropertySignature]) -> IndexMap<String, TypeDescriptor> {
        props
            .iter()
            .map(|prop| {
                let desc = self.resolve(&prop.annotation);
                let desc = if prop.optional { desc.into_nullable() } else { desc };
                (prop.name.clone(), desc)
            })
            .collect()
    }

    fn reference(&mut self, name: &str, args: &[TypeAnnotation]) -> TypeDescriptor {
        if self.type_params.contains(name) {
            return TypeDescriptor::any();
        }
        match (name, args) {
            (n, [inner]) if PASSTHROUGH.contains(&n) => return self.resolve(inner),
            (n, [inner]) if LIST_WRAPPERS.contains(&n) => return TypeDescriptor::array(self.resolve(inner)),
            ("NonNullable", [inner]) => {
                let desc = self.resolve(inner);
                return TypeDescriptor {
                    nullable: false,
                    ..desc
                };
            }
            (n, [_, _]) if MAP_WRAPPERS.contains(&n) => return TypeDescriptor::of(TypeKind::Object),
            _ => {}
        }

        if self.in_progress.contains(name) {
            tracing::debug!(name, "cyclic type reference resolved to any");
            return TypeDescriptor::any();
        }
        if let Some(alias) = self.aliases.get(name).copied() {
            self.in_progress.insert(name.to_string());
            let desc = self.resolve(&alias.annotation);
            self.in_progress.remove(name);
            return desc;
        }
        if let Some(interface) = self.interfaces.get(name).copied() {
            self.in_progress.insert(name.to_string());
            let desc = self.interface(interface);
            self.in_progress.remove(name);
            return desc;
        }
        TypeDescriptor::reference(name)
    }

    /// Base shapes first, then the interface's own members on top.
    fn interface(&mut self, decl: &InterfaceDecl) -> TypeDescriptor {
        let mut parts: Vec<TypeDescriptor> = decl.extends.iter().map(|base| self.resolve(base)).collect();
        parts.push(TypeDescriptor::object(self.shape(&decl.members)));
        TypeDescriptor::intersect(parts)
    }
}

fn keyword_descriptor(keyword: Keyword) -> TypeDescriptor {
    match keyword {
        Keyword::String => TypeDescriptor::string(),
        Keyword::Number | Keyword::BigInt => TypeDescriptor::number(),
        Keyword::Boolean => TypeDescriptor::boolean(),
        Keyword::Null => TypeDescriptor::null(),
        Keyword::Undefined | Keyword::Void => TypeDescriptor::undefined(),
        Keyword::Object => TypeDescriptor::object(IndexMap::new()),
        Keyword::Any | Keyword::Unknown | Keyword::Never | Keyword::Symbol => TypeDescriptor::any(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exemplar_types::SourceFile;

    fn module(src: &str) -> AnnotatedModule {
        let (module, errors) = exemplar_parser::parse_annotated(&SourceFile::new("t.ts", src));
        if let Some(d) = errors.first_error() {
            panic!("{}", d.render());
        }
        module
    }

    /// Resolve the return annotation of the first function in `src`.
    fn returns(src: &str) -> TypeDescriptor {
        let m = module(src);
        let f = &m.functions[0];
        let mut resolver = AnnotationResolver::new(&m);
        resolver.with_type_params(&f.type_params);
        resolver.resolve(f.returns.as_ref().expect("return annotation"))
    }

    #[test]
    fn test_keywords_and_arrays() {
        assert_eq!(returns("function f(): string { }").kind, TypeKind::String);
        let desc = returns("function f(): number[] { }");
        assert_eq!(desc.kind, TypeKind::Array);
        assert_eq!(desc.items.unwrap().kind, TypeKind::Number);
        let desc = returns("function f(): Array<boolean> { }");
        assert_eq!(desc.items.unwrap().kind, TypeKind::Boolean);
    }

    #[test]
    fn test_union_with_null_is_nullable() {
        let desc = returns("function f(): string | null { }");
        assert_eq!(desc.kind, TypeKind::String);
        assert!(desc.nullable);
        let desc = returns("function f(): string | number | undefined { }");
        assert_eq!(desc.kind, TypeKind::Union);
        assert!(!desc.nullable);
    }

    #[test]
    fn test_interface_extends_merges_base_first() {
        let desc = returns(
            "interface Base { id: number; name: string }\ninterface User extends Base { name: string | null; email?: string }\nfunction f(): User { }",
        );
        let shape = desc.shape.unwrap();
        let keys: Vec<&str> = shape.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["id", "name", "email"]);
        assert!(shape["name"].nullable);
        assert!(shape["email"].nullable);
    }

    #[test]
    fn test_intersection_merges_shapes() {
        let desc = returns("type A = { a: string }\ntype B = { b: number }\nfunction f(): A & B { }");
        assert_eq!(desc.shape.unwrap().len(), 2);
    }

    #[test]
    fn test_cycle_resolves_to_any() {
        let desc = returns("interface Node { value: number; next: Node | null }\nfunction f(): Node { }");
        let shape = desc.shape.unwrap();
        assert!(shape["next"].is_any());
    }

    #[test]
    fn test_wrappers_unwrap() {
        assert_eq!(returns("async function f(): Promise<string> { }").kind, TypeKind::String);
        assert_eq!(returns("function f(): Record<string, number> { }").kind, TypeKind::Object);
        let desc = returns("function f<T>(): T[] { }");
        assert!(desc.items.unwrap().is_any());
    }

    #[test]
    fn test_unknown_reference_kept_by_name() {
        let desc = returns("function f(): Widget { }");
        assert!(desc.is_any());
        assert_eq!(desc.reference.as_deref(), Some("Widget"));
    }
}
