//! The index of known types that frames are resolved against.
//!
//! Building the catalog is up to the host: it knows how to enumerate the
//! modules of the running program and introspect their types. This module only
//! defines the shape of that index, and how to assemble and query it.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resolver::ResolvedMethod;

/// Separates a nested type from its declaring type in [`TypeInfo::full_name`].
pub const NESTED_TYPE_SEPARATOR: char = '+';

static NEXT_CATALOG_ID: AtomicU64 = AtomicU64::new(1);

/// Error when loading a [`TypeCatalog`].
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The JSON description could not be read or written.
    #[error("invalid type catalog")]
    Json(#[from] serde_json::Error),
}

/// A method or constructor declared by a type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodInfo {
    /// The method name. Constructors use the runtime's constructor name.
    pub name: String,
    /// The types of the formal parameters, in declaration order.
    ///
    /// Entries can be either short or namespace-qualified type names; only
    /// their short names take part in resolution.
    #[serde(default)]
    pub parameters: Vec<String>,
    /// Whether the method is static.
    #[serde(default)]
    pub is_static: bool,
}

impl MethodInfo {
    /// Create a new instance method.
    pub fn new<S: Into<String>>(name: S, parameters: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            parameters: parameters.into_iter().map(Into::into).collect(),
            is_static: false,
        }
    }

    /// Create a new static method.
    pub fn new_static<S: Into<String>>(name: S, parameters: impl IntoIterator<Item = S>) -> Self {
        Self {
            is_static: true,
            ..Self::new(name, parameters)
        }
    }
}

/// A type known to the host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    /// The namespace-qualified name. Nested types use
    /// [`NESTED_TYPE_SEPARATOR`] between declaring and nested type.
    pub full_name: String,
    /// Whether this type is declared inside another type.
    #[serde(default)]
    pub nested: bool,
    /// The module (assembly, shared object, ...) that contains the type.
    #[serde(default)]
    pub module: Option<String>,
    /// Declared constructors, both instance and static.
    #[serde(default)]
    pub constructors: Vec<MethodInfo>,
    /// Declared methods.
    #[serde(default)]
    pub methods: Vec<MethodInfo>,
}

impl TypeInfo {
    /// Create a new top-level type without members.
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            nested: false,
            module: None,
            constructors: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Create a new nested type without members.
    ///
    /// `full_name` must use [`NESTED_TYPE_SEPARATOR`], as in `Ns.Outer+Inner`.
    pub fn nested(full_name: impl Into<String>) -> Self {
        Self {
            nested: true,
            ..Self::new(full_name)
        }
    }

    /// Sets the containing module.
    pub fn in_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Adds a constructor.
    pub fn with_constructor(mut self, constructor: MethodInfo) -> Self {
        self.constructors.push(constructor);
        self
    }

    /// Adds a method.
    pub fn with_method(mut self, method: MethodInfo) -> Self {
        self.methods.push(method);
        self
    }
}

/// The types of one module, as produced by the host's introspection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// The module name. It is recorded on every contained type.
    pub name: String,
    /// The types of the module.
    pub types: Vec<TypeInfo>,
}

/// Which member list of a type a [`MethodId`] points into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum MemberKind {
    Constructor,
    Method,
}

/// A handle to a member of a type within one [`TypeCatalog`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct MethodId {
    pub(crate) ty: usize,
    pub(crate) kind: MemberKind,
    pub(crate) index: usize,
}

/// A read-only index of known types.
///
/// # Examples
///
/// ```
/// use textrace::{MethodInfo, StackFrame, TypeCatalog, TypeInfo};
///
/// let catalog = TypeCatalog::new([TypeInfo::new("MyApp.Program")
///     .with_method(MethodInfo::new_static("Main", ["System.String[]"]))]);
///
/// let frame = StackFrame::try_parse("   at MyApp.Program.Main(String[] args)");
/// let method = frame.resolve(&catalog).unwrap();
/// assert_eq!(method.name(), "Main");
/// assert_eq!(method.to_string(), "MyApp.Program.Main(System.String[])");
/// ```
#[derive(Clone)]
pub struct TypeCatalog {
    id: u64,
    types: Vec<TypeInfo>,
    by_name: HashMap<String, Vec<usize>>,
}

impl fmt::Debug for TypeCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeCatalog")
            .field("id", &self.id)
            .field("types", &self.types.len())
            .finish()
    }
}

impl Default for TypeCatalog {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromIterator<TypeInfo> for TypeCatalog {
    fn from_iter<I: IntoIterator<Item = TypeInfo>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl TypeCatalog {
    /// Create a new catalog out of the given types.
    pub fn new(types: impl IntoIterator<Item = TypeInfo>) -> Self {
        let types: Vec<TypeInfo> = types.into_iter().collect();

        let mut by_name: HashMap<String, Vec<usize>> = HashMap::with_capacity(types.len());
        for (index, ty) in types.iter().enumerate() {
            by_name
                .entry(ty.full_name.clone())
                .or_insert_with(|| Vec::with_capacity(1))
                .push(index);
        }

        Self {
            id: NEXT_CATALOG_ID.fetch_add(1, Ordering::Relaxed),
            types,
            by_name,
        }
    }

    /// Create a catalog without any types. Nothing resolves against it.
    pub fn empty() -> Self {
        Self::new([])
    }

    /// Assembles a catalog out of per-module introspection results.
    ///
    /// Modules that failed to load are skipped.
    pub fn from_modules<I, E>(modules: I) -> Self
    where
        I: IntoIterator<Item = Result<Module, E>>,
        E: fmt::Display,
    {
        let types = modules
            .into_iter()
            .filter_map(|module| match module {
                Ok(module) => Some(module),
                Err(err) => {
                    log::warn!("skipping module that failed to load: {}", err);
                    None
                }
            })
            .flat_map(|Module { name, types }| {
                types.into_iter().map(move |mut ty| {
                    ty.module = Some(name.clone());
                    ty
                })
            });

        Self::new(types)
    }

    /// Loads a catalog from its JSON description, a list of [`TypeInfo`]s.
    ///
    /// # Examples
    ///
    /// ```
    /// use textrace::TypeCatalog;
    ///
    /// let catalog = TypeCatalog::from_json(
    ///     r#"[{"full_name": "Ns.Type", "methods": [{"name": "Run"}]}]"#,
    /// )
    /// .unwrap();
    /// assert_eq!(catalog.len(), 1);
    ///
    /// assert!(TypeCatalog::from_json("{").is_err());
    /// ```
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let types: Vec<TypeInfo> = serde_json::from_str(json)?;
        Ok(Self::new(types))
    }

    /// Serializes the catalog into the JSON description read by [`Self::from_json`].
    pub fn to_json(&self) -> Result<String, CatalogError> {
        Ok(serde_json::to_string(&self.types)?)
    }

    /// Calculates a UUID of the catalog content.
    ///
    /// Catalogs with the same types in the same order share a UUID.
    #[cfg(feature = "uuid")]
    pub fn uuid(&self) -> Result<uuid::Uuid, CatalogError> {
        lazy_static::lazy_static! {
            static ref NAMESPACE: uuid::Uuid =
                uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, b"textrace.type-catalog");
        }
        let json = serde_json::to_vec(&self.types)?;
        Ok(uuid::Uuid::new_v5(&NAMESPACE, &json))
    }

    /// The number of types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the catalog has no types.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// All types, in the order they were added.
    pub fn types(&self) -> &[TypeInfo] {
        &self.types
    }

    /// All types with the given full name.
    pub fn find_types<'c>(
        &'c self,
        full_name: &str,
    ) -> impl Iterator<Item = (usize, &'c TypeInfo)> {
        self.by_name
            .get(full_name)
            .into_iter()
            .flatten()
            .map(|&index| (index, &self.types[index]))
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn resolved_method(&self, id: MethodId) -> Option<ResolvedMethod<'_>> {
        let declaring_type = self.types.get(id.ty)?;
        let members = match id.kind {
            MemberKind::Constructor => &declaring_type.constructors,
            MemberKind::Method => &declaring_type.methods,
        };
        let method = members.get(id.index)?;

        Some(ResolvedMethod {
            declaring_type,
            method,
            is_constructor: id.kind == MemberKind::Constructor,
        })
    }
}
