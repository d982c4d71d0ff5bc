use crate::{
    parser::{ParseError, ParseErrorWithContext},
    span::Span,
    tree_walk_interpreter::ExecutionError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lexical,
    Syntax,
    Runtime,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticKind::Lexical => write!(f, "lexical"),
            DiagnosticKind::Syntax => write!(f, "syntax"),
            DiagnosticKind::Runtime => write!(f, "runtime"),
        }
    }
}

/// A reported problem with a program. `span` is set for every language
/// error; only I/O failures have no position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Option<Span>,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.span {
            Some(span) => write!(f, "error[{}] {}: {}", self.kind, span, self.message),
            None => write!(f, "error[{}]: {}", self.kind, self.message),
        }
    }
}

impl From<&ParseErrorWithContext> for Diagnostic {
    fn from(error: &ParseErrorWithContext) -> Self {
        let kind = match error.error {
            ParseError::Tokenize(_) => DiagnosticKind::Lexical,
            _ => DiagnosticKind::Syntax,
        };
        Diagnostic {
            kind,
            message: error.error.to_string(),
            span: Some(error.span.clone()),
        }
    }
}

impl From<&ExecutionError> for Diagnostic {
    fn from(error: &ExecutionError) -> Self {
        Diagnostic {
            kind: DiagnosticKind::Runtime,
            message: error.kind().to_string(),
            span: error.kind().span().cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    #[test]
    fn test_parse_errors_become_diagnostics() {
        let errors = parser::program("x = 1 @;\nprint 2;").unwrap_err();
        let diagnostics: Vec<Diagnostic> = errors.errors().iter().map(Diagnostic::from).collect();
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::Lexical);
        assert_eq!(
            diagnostics[0].to_string(),
            "error[lexical] 1:7: Unexpected character '@'"
        );
        assert_eq!(diagnostics[1].kind, DiagnosticKind::Syntax);
        assert_eq!(diagnostics[1].span.as_ref().unwrap().start_line, 2);
    }

    #[test]
    fn test_display_without_span() {
        let diagnostic = Diagnostic {
            kind: DiagnosticKind::Runtime,
            message: "Step limit of 10 exceeded".to_string(),
            span: None,
        };
        assert_eq!(
            diagnostic.to_string(),
            "error[runtime]: Step limit of 10 exceeded"
        );
    }
}
