use std::fmt;
use std::ops::Range;

use ariadne::{Color, Label, Report, ReportKind, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A parse or compile diagnostic. IL is line-oriented, so every diagnostic
/// carries the 1-based source line alongside the byte span of that line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub line: u32,
    pub span: Range<usize>,
}

impl Diagnostic {
    pub fn error(line: u32, span: Range<usize>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            line,
            span,
        }
    }

    pub fn warning(line: u32, span: Range<usize>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            line,
            span,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

pub fn render_diagnostic(source_name: &str, source_text: &str, diagnostic: &Diagnostic) -> String {
    let mut output = Vec::new();
    let report = Report::build(
        match diagnostic.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        },
        source_name.to_string(),
        diagnostic.span.start,
    )
    .with_message(diagnostic.message.clone())
    .with_label(
        Label::new((source_name.to_string(), diagnostic.span.clone()))
            .with_color(match diagnostic.severity {
                Severity::Error => Color::Red,
                Severity::Warning => Color::Yellow,
            })
            .with_message("here"),
    );

    let _ = report.finish().write(
        (source_name.to_string(), Source::from(source_text.to_string())),
        &mut output,
    );

    String::from_utf8_lossy(&output).into_owned()
}

pub fn render_diagnostics(
    source_name: &str,
    source_text: &str,
    diagnostics: &[Diagnostic],
) -> String {
    diagnostics
        .iter()
        .map(|diag| render_diagnostic(source_name, source_text, diag))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_line() {
        let diag = Diagnostic::error(3, 10..20, "unknown instruction 'FOO'");
        assert_eq!(diag.to_string(), "line 3: unknown instruction 'FOO'");
    }

    #[test]
    fn rendering_includes_message_and_source_name() {
        let source = "NETWORK 1\nFOO X1\n";
        let diag = Diagnostic::error(2, 10..16, "unknown instruction 'FOO'");
        let rendered = render_diagnostic("demo.il", source, &diag);
        assert!(rendered.contains("unknown instruction"));
        assert!(rendered.contains("demo.il"));
    }
}
