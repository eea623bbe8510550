//! A Parser for textual StackTraces.
//!
//! The accepted format is the one printed by managed runtimes that render each
//! frame as `at Namespace.Type.Method(ParamType name, ...) in File.cs:line 42`.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::OnceLock;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use crate::catalog::{MethodId, TypeCatalog};
use crate::resolver::{self, ResolvedMethod};

/// The method name used by the runtime for frames inside an instance constructor.
pub const CONSTRUCTOR_NAME: &str = ".ctor";

/// Number of leading lines produced by the capture mechanism itself.
///
/// These are the call into the capture routine and its internal helpers. A
/// host whose capture primitive emits a different number of self-frames has to
/// override this through [`CaptureOptions::self_frames`].
pub const SELF_FRAMES: usize = 3;

/// Frames skipped by [`StackTrace::parse`], which hides the direct caller's wrapper frame.
pub const DEFAULT_SKIP_FRAMES: usize = 1;

lazy_static! {
    static ref FRAME_RE: Regex = Regex::new(
        r"(?x)
        \b
        (?P<type>[^.\x20]+(?:\.[^.\x20]+)*)
        \.
        (?P<method>\.?[^.\x20]+)
        \(
        (?P<params>
            (?:[^\x20\t\r\n]+[\x20\t\r\n]+[^\x20\t\r\n,)]+)?
            (?:[\x20\t\r\n]*,[\x20\t\r\n]*[^\x20\t\r\n]+[\x20\t\r\n]+[^\x20\t\r\n,)]+)*
        )
        \)
        (?:\x20in\x20(?P<file>[^\r\n]+):line\x20(?P<line>[0-9]{1,9}))?
        "
    )
    .unwrap();
    // Applied to the `params` span of a match, yields one `type` per parameter.
    static ref PARAM_RE: Regex = Regex::new(
        r"(?x)
        (?:^|[\x20\t\r\n]*,[\x20\t\r\n]*)
        (?P<type>[^\x20\t\r\n]+)
        [\x20\t\r\n]+
        [^\x20\t\r\n,)]+
        "
    )
    .unwrap();
}

/// Options controlling how many leading lines [`StackTrace::capture_with`] drops.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    /// Lines emitted by the capture mechanism itself.
    pub self_frames: usize,
    /// Additional frames the caller wants to hide.
    pub skip_frames: usize,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            self_frames: SELF_FRAMES,
            skip_frames: 0,
        }
    }
}

impl CaptureOptions {
    /// Options skipping `skip_frames` frames on top of the default self-frames.
    pub fn skipping(skip_frames: usize) -> Self {
        Self {
            skip_frames,
            ..Default::default()
        }
    }

    fn lines_to_drop(&self) -> usize {
        self.self_frames.saturating_add(self.skip_frames)
    }
}

/// A captured StackTrace.
///
/// The frames keep the order in which they appeared in the raw text.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StackTrace<'s> {
    pub(crate) frames: Vec<StackFrame<'s>>,
}

impl<'s> StackTrace<'s> {
    /// Create a StackTrace out of already parsed frames.
    pub fn new(frames: Vec<StackFrame<'s>>) -> Self {
        Self { frames }
    }

    /// Create a StackTrace holding exactly one frame.
    pub fn from_frame(frame: StackFrame<'s>) -> Self {
        Self {
            frames: vec![frame],
        }
    }

    /// Parses a raw StackTrace, dropping the capture mechanism's self-frames
    /// and the [`DEFAULT_SKIP_FRAMES`] frames of the direct caller.
    pub fn parse(raw: &'s str) -> Self {
        Self::capture(raw, DEFAULT_SKIP_FRAMES)
    }

    /// Parses a raw StackTrace, dropping the [`SELF_FRAMES`] self-frames plus
    /// `skip_frames` more.
    ///
    /// # Examples
    ///
    /// ```
    /// use textrace::StackTrace;
    ///
    /// let raw = "\
    ///    at System.Environment.get_StackTrace()
    ///    at Rock.Diagnostics.StackTrace..ctor(Int32 skipFrames)
    ///    at Rock.Diagnostics.StackTrace..ctor()
    ///    at MyApp.Program.Main(String[] args) in Program.cs:line 12
    /// ";
    /// let trace = StackTrace::capture(raw, 0);
    /// assert_eq!(trace.frame_count(), 1);
    ///
    /// let frame = trace.frame(0);
    /// assert_eq!(frame.type_name(), Some("MyApp.Program"));
    /// assert_eq!(frame.method_name(), Some("Main"));
    /// assert_eq!(frame.parameter_type_names(), ["String[]"]);
    /// assert_eq!(frame.file_name(), Some("Program.cs"));
    /// assert_eq!(frame.line_number(), Some(12));
    /// ```
    pub fn capture(raw: &'s str, skip_frames: usize) -> Self {
        Self::capture_with(raw, CaptureOptions::skipping(skip_frames))
    }

    /// Parses a raw StackTrace with explicit [`CaptureOptions`].
    pub fn capture_with(raw: &'s str, options: CaptureOptions) -> Self {
        let frames: Vec<_> = raw
            .lines()
            .filter(|line| !line.is_empty())
            .skip(options.lines_to_drop())
            .map(StackFrame::try_parse)
            .collect();

        log::trace!(
            "captured {} frames after dropping {} lines",
            frames.len(),
            options.lines_to_drop()
        );

        Self { frames }
    }

    /// The number of frames.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// The frame at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn frame(&self, index: usize) -> &StackFrame<'s> {
        &self.frames[index]
    }

    /// The frame at `index`, or `None` if it is out of bounds.
    pub fn get(&self, index: usize) -> Option<&StackFrame<'s>> {
        self.frames.get(index)
    }

    /// All frames as a borrowed slice.
    pub fn frames(&self) -> &[StackFrame<'s>] {
        &self.frames
    }

    /// An independent copy of all frames.
    pub fn to_frames(&self) -> Vec<StackFrame<'s>> {
        self.frames.clone()
    }
}

impl<'s> Display for StackTrace<'s> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        for frame in &self.frames {
            writeln!(f, "{}", frame)?;
        }
        Ok(())
    }
}

/// A single StackFrame.
///
/// Holds the raw line it was parsed from, and whatever the frame grammar could
/// extract from it. The method it refers to is resolved lazily, see
/// [`StackFrame::resolve`].
#[derive(Clone, Debug)]
pub struct StackFrame<'s> {
    pub(crate) raw: &'s str,
    pub(crate) signature: Option<(&'s str, &'s str)>,
    pub(crate) parameters: Vec<&'s str>,
    pub(crate) file: Option<&'s str>,
    pub(crate) line: Option<u32>,
    resolved: OnceLock<(u64, Option<MethodId>)>,
}

impl<'s> StackFrame<'s> {
    /// Create a new StackFrame.
    pub fn new(type_name: &'s str, method: &'s str, parameters: Vec<&'s str>) -> Self {
        Self {
            raw: "",
            signature: Some((type_name, method)),
            parameters,
            file: None,
            line: None,
            resolved: OnceLock::new(),
        }
    }

    /// Create a new StackFrame with file information.
    pub fn with_file(
        type_name: &'s str,
        method: &'s str,
        parameters: Vec<&'s str>,
        file: &'s str,
        line: u32,
    ) -> Self {
        Self {
            file: Some(file),
            line: Some(line),
            ..Self::new(type_name, method, parameters)
        }
    }

    /// Parses a StackFrame from a line of a StackTrace.
    ///
    /// This never fails: a line that does not look like a frame yields a
    /// StackFrame without any structured information, which still carries the
    /// raw text.
    ///
    /// # Examples
    ///
    /// ```
    /// use textrace::StackFrame;
    ///
    /// let frame = StackFrame::try_parse(
    ///     "   at Ns.Type.Method(ParamType1 p1, ParamType2 p2) in file.ext:line 42",
    /// );
    /// assert_eq!(frame.type_name(), Some("Ns.Type"));
    /// assert_eq!(frame.method_name(), Some("Method"));
    /// assert_eq!(frame.parameter_type_names(), ["ParamType1", "ParamType2"]);
    /// assert_eq!(frame.file_name(), Some("file.ext"));
    /// assert_eq!(frame.line_number(), Some(42));
    ///
    /// let header = StackFrame::try_parse("--- End of stack trace ---");
    /// assert!(!header.is_match());
    /// ```
    pub fn try_parse(line: &'s str) -> Self {
        parse_frame(line)
    }

    /// The raw line this frame was parsed from.
    pub fn raw(&self) -> &'s str {
        self.raw
    }

    /// Whether the line matched the frame grammar.
    pub fn is_match(&self) -> bool {
        self.signature.is_some()
    }

    /// The dotted name of the declaring type, as written in the trace.
    pub fn type_name(&self) -> Option<&'s str> {
        self.signature.map(|(type_name, _)| type_name)
    }

    /// The method name, or [`CONSTRUCTOR_NAME`] for constructor frames.
    pub fn method_name(&self) -> Option<&'s str> {
        self.signature.map(|(_, method)| method)
    }

    /// Whether this frame is inside a constructor.
    pub fn is_constructor(&self) -> bool {
        self.method_name() == Some(CONSTRUCTOR_NAME)
    }

    /// The short type names of the method's parameters.
    pub fn parameter_type_names(&self) -> &[&'s str] {
        &self.parameters
    }

    /// The source file, if the runtime embedded it.
    pub fn file_name(&self) -> Option<&'s str> {
        self.file
    }

    /// The 1-based source line, if the runtime embedded it.
    pub fn line_number(&self) -> Option<u32> {
        self.line
    }

    /// Resolves the method this frame refers to within `catalog`.
    ///
    /// Returns `None` if the frame did not match the grammar, its declaring
    /// type is unknown or ambiguous, or the method overload is ambiguous.
    ///
    /// The result for the first catalog this is called with is cached for the
    /// lifetime of the frame. Other catalogs are resolved without caching.
    pub fn resolve<'c>(&self, catalog: &'c TypeCatalog) -> Option<ResolvedMethod<'c>> {
        let (cached_for, cached) = *self
            .resolved
            .get_or_init(|| (catalog.id(), resolver::resolve_frame(self, catalog)));

        let id = if cached_for == catalog.id() {
            cached
        } else {
            resolver::resolve_frame(self, catalog)
        };

        catalog.resolved_method(id?)
    }
}

impl PartialEq for StackFrame<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
            && self.signature == other.signature
            && self.parameters == other.parameters
            && self.file == other.file
            && self.line == other.line
    }
}

impl<'s> Display for StackFrame<'s> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if !self.raw.is_empty() {
            return f.write_str(self.raw);
        }

        let Some((type_name, method)) = self.signature else {
            return Ok(());
        };
        write!(f, "   at {}.{}(", type_name, method)?;
        for (i, param) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(param)?;
        }
        f.write_str(")")?;
        if let (Some(file), Some(line)) = (self.file, self.line) {
            write!(f, " in {}:line {}", file, line)?;
        }
        Ok(())
    }
}

/// Parses a single line from a StackTrace.
pub(crate) fn parse_frame(line: &str) -> StackFrame<'_> {
    let mut frame = StackFrame {
        raw: line,
        signature: None,
        parameters: Vec::new(),
        file: None,
        line: None,
        resolved: OnceLock::new(),
    };

    let Some(captures) = FRAME_RE.captures(line) else {
        return frame;
    };

    // `type` and `method` are mandatory parts of the pattern.
    if let (Some(type_name), Some(method)) = (captures.name("type"), captures.name("method")) {
        frame.signature = Some((type_name.as_str(), method.as_str()));
    }
    if let Some(params) = captures.name("params") {
        frame.parameters = PARAM_RE
            .captures_iter(params.as_str())
            .filter_map(|param| param.name("type"))
            .map(|ty| ty.as_str())
            .collect();
    }
    if let (Some(file), Some(line)) = (captures.name("file"), captures.name("line")) {
        frame.file = Some(file.as_str());
        frame.line = line.as_str().parse().ok();
    }

    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_frame() {
        let line = "   at Rock.Mail.DeliveryMethod.Send(MailMessage message, String to) \
                    in C:\\src\\Mail.cs:line 57";
        let frame = parse_frame(line);

        assert_eq!(frame.raw(), line);
        assert_eq!(frame.type_name(), Some("Rock.Mail.DeliveryMethod"));
        assert_eq!(frame.method_name(), Some("Send"));
        assert_eq!(frame.parameter_type_names(), ["MailMessage", "String"]);
        assert_eq!(frame.file_name(), Some("C:\\src\\Mail.cs"));
        assert_eq!(frame.line_number(), Some(57));
    }

    #[test]
    fn zero_parameters() {
        let frame = parse_frame("   at Ns.Type.Method()");

        assert!(frame.is_match());
        assert!(frame.parameter_type_names().is_empty());
        assert_eq!(frame.file_name(), None);
        assert_eq!(frame.line_number(), None);

        let frame = parse_frame("   at Ns.Type.Method() in /src/Type.cs:line 3");
        assert!(frame.parameter_type_names().is_empty());
        assert_eq!(frame.file_name(), Some("/src/Type.cs"));
        assert_eq!(frame.line_number(), Some(3));
    }

    #[test]
    fn no_file_info() {
        let frame = parse_frame("   at Ns.Type.Method(Int32 a, Boolean b)");

        assert_eq!(frame.parameter_type_names(), ["Int32", "Boolean"]);
        assert_eq!(frame.file_name(), None);
        assert_eq!(frame.line_number(), None);
    }

    #[test]
    fn constructor() {
        let frame = parse_frame("   at Ns.Widget..ctor(String name)");

        assert_eq!(frame.type_name(), Some("Ns.Widget"));
        assert_eq!(frame.method_name(), Some(CONSTRUCTOR_NAME));
        assert!(frame.is_constructor());
        assert_eq!(frame.parameter_type_names(), ["String"]);
    }

    #[test]
    fn nested_type_is_dotted() {
        let frame = parse_frame("   at Ns.Outer.Inner.Run()");

        assert_eq!(frame.type_name(), Some("Ns.Outer.Inner"));
        assert_eq!(frame.method_name(), Some("Run"));
    }

    #[test]
    fn parameter_whitespace() {
        let frame = parse_frame("   at Ns.Type.Method(Int32  a ,\tString\tb , Options c)");

        assert_eq!(frame.parameter_type_names(), ["Int32", "String", "Options"]);
    }

    #[test]
    fn no_match() {
        for line in ["", "   --- End of inner exception stack trace ---", "Unhandled exception."] {
            let frame = parse_frame(line);

            assert_eq!(frame.raw(), line);
            assert!(!frame.is_match());
            assert_eq!(frame.type_name(), None);
            assert_eq!(frame.method_name(), None);
            assert!(frame.parameter_type_names().is_empty());
            assert_eq!(frame.file_name(), None);
            assert_eq!(frame.line_number(), None);
        }
    }

    #[test]
    fn print_stack_frame() {
        let line = "   at Ns.Type.Method(Int32 a)";
        assert_eq!(parse_frame(line).to_string(), line);

        let frame =
            StackFrame::with_file("Ns.Type", "Method", vec!["Int32", "String"], "Type.cs", 9);
        assert_eq!(
            frame.to_string(),
            "   at Ns.Type.Method(Int32, String) in Type.cs:line 9"
        );

        let frame = StackFrame::new("Ns.Type", CONSTRUCTOR_NAME, vec![]);
        assert_eq!(frame.to_string(), "   at Ns.Type..ctor()");
    }

    #[test]
    fn capture_skips_self_frames() {
        let raw = "self1\r\nself2\r\n\r\nself3\r\n   at A.B.C()\r\n   at A.B.D(Int32 x)\r\n";

        let trace = StackTrace::capture(raw, 0);
        assert_eq!(trace.frame_count(), 2);
        assert_eq!(trace.frame(0).method_name(), Some("C"));
        assert_eq!(trace.frame(1).method_name(), Some("D"));

        let trace = StackTrace::parse(raw);
        assert_eq!(trace.frame_count(), 1);
        assert_eq!(trace.frame(0).method_name(), Some("D"));

        assert_eq!(StackTrace::capture(raw, 5).frame_count(), 0);
    }

    #[test]
    fn capture_with_options() {
        let raw = "   at A.B.C()\n   at A.B.D()\n   at A.B.E()";
        let options = CaptureOptions {
            self_frames: 1,
            skip_frames: 1,
        };

        let trace = StackTrace::capture_with(raw, options);
        assert_eq!(trace.frame_count(), 1);
        assert_eq!(trace.frame(0).method_name(), Some("E"));
    }

    #[test]
    fn options_from_json() {
        let options: CaptureOptions = serde_json::from_str(r#"{"skip_frames": 2}"#).unwrap();
        assert_eq!(options, CaptureOptions::skipping(2));
        assert_eq!(options.self_frames, SELF_FRAMES);
    }

    #[test]
    fn frames_are_independent_copies() {
        let trace = StackTrace::capture("1\n2\n3\n   at A.B.C()\n   at A.B.D()", 0);

        let mut frames = trace.to_frames();
        frames.clear();

        assert_eq!(trace.frame_count(), 2);
        assert_eq!(trace.get(2), None);
    }

    #[test]
    #[should_panic]
    fn frame_out_of_range() {
        let trace = StackTrace::from_frame(parse_frame("   at A.B.C()"));
        trace.frame(1);
    }

    #[test]
    fn print_stack_trace() {
        let raw = "   at A.B.C()\n   at A.B.D(Int32 x) in D.cs:line 4";
        let trace = StackTrace::capture_with(
            raw,
            CaptureOptions {
                self_frames: 0,
                skip_frames: 0,
            },
        );

        assert_eq!(trace.to_string(), format!("{}\n", raw));
    }
}
