//! Identifies the module a program was entered through, from a captured trace.

use std::collections::HashSet;

use thiserror::Error;

use crate::catalog::TypeCatalog;
use crate::stacktrace::StackTrace;

/// Modules of runtime libraries, hosting processes and test runners that are
/// never an application's entry module.
pub const DEFAULT_IGNORED_MODULES: &[&str] = &[
    "mscorlib",
    "Microsoft.VisualStudio.HostingProcess.Utilities",
    "nunit.core",
    "JetBrains.ReSharper.UnitTestRunner.nUnit",
    "JetBrains.ReSharper.TaskRunnerFramework",
];

/// Error when no entry module can be determined.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntryModuleError {
    /// No frame resolved to a method of a module outside the ignore list.
    #[error("unable to determine entry module")]
    NotFound,
}

/// Finds the entry module of a program by walking its stack.
///
/// The outermost frame whose method lives in a module that is not ignored
/// decides. Hosting processes and test runners sit above the real entry point,
/// so their modules are usually ignored.
///
/// # Examples
///
/// ```
/// use textrace::{EntryModuleFinder, MethodInfo, StackTrace, TypeCatalog, TypeInfo};
///
/// let catalog = TypeCatalog::new([
///     TypeInfo::new("MyApp.Program")
///         .in_module("MyApp")
///         .with_method(MethodInfo::new_static("Main", ["String[]"])),
///     TypeInfo::new("TestRunner.Host")
///         .in_module("TestRunner")
///         .with_method(MethodInfo::new_static("Run", [])),
/// ]);
/// let trace = StackTrace::capture(
///     "self\nself\nself\n   at MyApp.Program.Main(String[] args)\n   at TestRunner.Host.Run()",
///     0,
/// );
///
/// let finder = EntryModuleFinder::new(["TestRunner"]);
/// assert_eq!(finder.find(&trace, &catalog), Ok("MyApp"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct EntryModuleFinder {
    ignored: HashSet<String>,
}

impl EntryModuleFinder {
    /// Create a new finder ignoring the given modules.
    pub fn new<I, S>(ignored: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored: ignored.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a new finder ignoring the [`DEFAULT_IGNORED_MODULES`].
    pub fn with_default_ignores() -> Self {
        Self::new(DEFAULT_IGNORED_MODULES.iter().copied())
    }

    /// Adds another module to ignore.
    pub fn ignore(mut self, module: impl Into<String>) -> Self {
        self.ignored.insert(module.into());
        self
    }

    /// Whether frames from `module` are skipped.
    pub fn is_ignored(&self, module: &str) -> bool {
        self.ignored.contains(module)
    }

    /// Returns the module of the outermost resolvable frame that is not ignored.
    pub fn find<'c>(
        &self,
        trace: &StackTrace<'_>,
        catalog: &'c TypeCatalog,
    ) -> Result<&'c str, EntryModuleError> {
        trace
            .frames()
            .iter()
            .rev()
            .filter_map(|frame| frame.resolve(catalog))
            .filter_map(|method| method.module())
            .find(|module| !self.is_ignored(module))
            .ok_or(EntryModuleError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MethodInfo, TypeInfo};

    fn catalog() -> TypeCatalog {
        TypeCatalog::new([
            TypeInfo::new("App.Program")
                .in_module("App")
                .with_method(MethodInfo::new_static("Main", [])),
            TypeInfo::new("App.Worker")
                .in_module("App.Core")
                .with_method(MethodInfo::new("Work", [])),
            TypeInfo::new("Runner.Host")
                .in_module("Runner")
                .with_method(MethodInfo::new("Start", [])),
            TypeInfo::new("Anon.Type").with_method(MethodInfo::new("Call", [])),
            TypeInfo::new("NUnit.Core.TestMethod")
                .in_module("nunit.core")
                .with_method(MethodInfo::new("RunTest", [])),
        ])
    }

    const RAW: &str = "\
   at Capture.One()
   at Capture.Two()
   at Capture.Three()
   at App.Worker.Work()
   at App.Program.Main()
   at Unknown.Type.Go()
   at Anon.Type.Call()
   at Runner.Host.Start()
   at NUnit.Core.TestMethod.RunTest()
";

    #[test]
    fn outermost_not_ignored() {
        let catalog = catalog();
        let trace = StackTrace::capture(RAW, 0);

        assert_eq!(EntryModuleFinder::default().find(&trace, &catalog), Ok("nunit.core"));

        let finder = EntryModuleFinder::new(["nunit.core", "Runner"]);
        assert_eq!(finder.find(&trace, &catalog), Ok("App"));

        let finder = finder.ignore("App");
        assert_eq!(finder.find(&trace, &catalog), Ok("App.Core"));
    }

    #[test]
    fn default_ignores() {
        let catalog = catalog();
        let trace = StackTrace::capture(RAW, 0);

        let finder = EntryModuleFinder::with_default_ignores();
        assert!(finder.is_ignored("mscorlib"));
        assert!(finder.is_ignored("nunit.core"));
        assert!(!finder.is_ignored("App"));
        assert_eq!(finder.find(&trace, &catalog), Ok("Runner"));

        let finder = finder.ignore("Runner");
        assert_eq!(finder.find(&trace, &catalog), Ok("App"));
    }

    #[test]
    fn not_found() {
        let catalog = catalog();
        let trace = StackTrace::capture(RAW, 0);

        let finder = EntryModuleFinder::new(["nunit.core", "Runner", "App", "App.Core"]);
        assert_eq!(finder.find(&trace, &catalog), Err(EntryModuleError::NotFound));

        let empty = TypeCatalog::empty();
        assert_eq!(
            EntryModuleFinder::default().find(&trace, &empty),
            Err(EntryModuleError::NotFound)
        );
        assert_eq!(
            EntryModuleError::NotFound.to_string(),
            "unable to determine entry module"
        );
    }
}
