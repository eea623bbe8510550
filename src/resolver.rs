//! Maps parsed frames back onto the methods of a [`TypeCatalog`].

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::catalog::{
    MemberKind, MethodId, MethodInfo, TypeCatalog, TypeInfo, NESTED_TYPE_SEPARATOR,
};
use crate::stacktrace::{StackFrame, CONSTRUCTOR_NAME};

/// A method a [`StackFrame`] was resolved to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedMethod<'c> {
    pub(crate) declaring_type: &'c TypeInfo,
    pub(crate) method: &'c MethodInfo,
    pub(crate) is_constructor: bool,
}

impl<'c> ResolvedMethod<'c> {
    /// The type declaring the method.
    pub fn declaring_type(&self) -> &'c TypeInfo {
        self.declaring_type
    }

    /// The method itself.
    pub fn method(&self) -> &'c MethodInfo {
        self.method
    }

    /// The method name.
    pub fn name(&self) -> &'c str {
        &self.method.name
    }

    /// Whether the method is a constructor.
    pub fn is_constructor(&self) -> bool {
        self.is_constructor
    }

    /// The module containing the declaring type, if known.
    pub fn module(&self) -> Option<&'c str> {
        self.declaring_type.module.as_deref()
    }
}

impl Display for ResolvedMethod<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{}.{}({})",
            self.declaring_type.full_name,
            self.method.name,
            self.method.parameters.join(", ")
        )
    }
}

/// Strips namespace, declaring types and generic arguments off a type name.
///
/// Both `System.Collections.Generic.List`1[System.Int32]` and
/// `System.Collections.Generic.List`1[[System.Int32, mscorlib]]` become `` List`1 ``,
/// `Ns.Outer+Inner` becomes `Inner` and `System.String[]` becomes `String[]`.
pub(crate) fn short_type_name(name: &str) -> &str {
    // array ranks (`[]`, `[,]`) are part of the short name, generic arguments are not
    let generic_args = name.match_indices('[').map(|(pos, _)| pos).find(|&pos| {
        !matches!(name[pos + 1..].chars().next(), Some(']') | Some(','))
    });
    let name = match generic_args {
        Some(pos) => &name[..pos],
        None => name,
    };
    match name.rfind(['.', NESTED_TYPE_SEPARATOR]) {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// The name a nested type would have in the catalog, if the last dotted
/// segment of `type_name` is a nested type: `A.B.C` becomes `A.B+C`.
fn nested_type_name(type_name: &str) -> Option<String> {
    let (declaring, nested) = type_name.rsplit_once('.')?;
    Some(format!("{}{}{}", declaring, NESTED_TYPE_SEPARATOR, nested))
}

/// Finds the single type a textual type name refers to.
///
/// A nested type whose name matches takes precedence over a top-level type
/// with the same dotted name. Duplicates within either group are ambiguous.
fn find_declaring_type(catalog: &TypeCatalog, type_name: &str) -> Option<usize> {
    let nested: Vec<usize> = nested_type_name(type_name)
        .map(|name| {
            catalog
                .find_types(&name)
                .filter(|(_, ty)| ty.nested)
                .map(|(index, _)| index)
                .collect()
        })
        .unwrap_or_default();

    let candidates: Vec<usize> = if nested.is_empty() {
        catalog
            .find_types(type_name)
            .filter(|(_, ty)| !ty.nested)
            .map(|(index, _)| index)
            .collect()
    } else {
        nested
    };

    match candidates[..] {
        [index] => Some(index),
        [] => None,
        _ => {
            log::debug!("ambiguous declaring type {}", type_name);
            None
        }
    }
}

fn parameters_match(method: &MethodInfo, parameter_type_names: &[&str]) -> bool {
    method.parameters.len() == parameter_type_names.len()
        && method
            .parameters
            .iter()
            .zip(parameter_type_names)
            .all(|(declared, written)| short_type_name(declared) == *written)
}

/// Resolves `frame` to a unique method within `catalog`.
///
/// Parameters are compared by their short names only, as the trace text does
/// not qualify them. Overloads that differ only in the namespaces of their
/// parameter types are thus indistinguishable and yield `None`.
pub(crate) fn resolve_frame(frame: &StackFrame<'_>, catalog: &TypeCatalog) -> Option<MethodId> {
    let (type_name, method_name) = frame.signature?;
    let ty = find_declaring_type(catalog, type_name)?;
    let declaring_type = &catalog.types()[ty];

    let (kind, members) = if method_name == CONSTRUCTOR_NAME {
        (MemberKind::Constructor, &declaring_type.constructors)
    } else {
        (MemberKind::Method, &declaring_type.methods)
    };

    let mut candidates = members.iter().enumerate().filter(|(_, method)| {
        let is_candidate = match kind {
            MemberKind::Constructor => !method.is_static,
            MemberKind::Method => method.name == method_name,
        };
        is_candidate && parameters_match(method, frame.parameter_type_names())
    });

    let (index, _) = candidates.next()?;
    // We never guess between overloads, returning nothing is better than the wrong method.
    if candidates.next().is_some() {
        log::debug!("ambiguous overloads for {}.{}", type_name, method_name);
        return None;
    }

    Some(MethodId { ty, kind, index })
}
