use crate::style::Style;
use crate::token::{Span, TokenKind};

#[derive(Debug, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
}

impl ParseError {
    pub fn display_with_source(&self, source: &str) -> String {
        let (line_num, line_start, line_content) = self.find_context(source);
        let col = self.span.start.saturating_sub(line_start);
        let len = (self.span.end - self.span.start).max(1);
        let underline = format!("{}{}", " ".repeat(col), "^".repeat(len));

        let error_label = Style::bold_red("error");
        let kind_str = self.kind.to_string();
        let line_num_str = Style::blue(&format!("{:4}", line_num));
        let pipe = Style::blue("|");
        let underline_colored = Style::red(&underline);

        format!(
            "{}: {}\n\n{} {} {}\n     {} {}",
            error_label, kind_str, line_num_str, pipe, line_content, pipe, underline_colored
        )
    }

    fn find_context<'a>(&self, source: &'a str) -> (usize, usize, &'a str) {
        let mut line_num = 1;
        let mut line_start = 0;
        for (i, c) in source.char_indices() {
            if i >= self.span.start {
                break;
            }
            if c == '\n' {
                line_num += 1;
                line_start = i + 1;
            }
        }
        let line_end = source[line_start..]
            .find('\n')
            .map(|off| line_start + off)
            .unwrap_or(source.len());
        (line_num, line_start, &source[line_start..line_end])
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}:{}", self.kind, self.span.line, self.span.column)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone)]
pub enum ParseErrorKind {
    Syntax(String),
    Expected { expected: String, found: TokenKind },
    UnknownOperator(TokenKind),
    IdentifierExpected,
    MissingInitExpression,
    SemicolonExpected,
    AssignExpected,
    CommaExpected,
    CommaOrCloseParenExpected,
    DuplicateDefinition(String),
    UndefinedSymbol(String),
    CannotModifyConst(String),
    OpenParenExpected,
    CloseParenExpected,
    OpenBraceExpected,
    CloseBraceExpected,
    InvalidStatement,
    ConditionExpressionExpected,
    BreakContinueNoLoop,
    ExpressionOrVarExpected,
    IllegalExpression,
    TooManyFunctionArgs(usize),
    InvalidLhs,
    UnexpectedToken(TokenKind),
    IllegalThis,
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseErrorKind::Syntax(s) => write!(f, "syntax error: {}", s),
            ParseErrorKind::Expected { expected, found } => write!(f, "expected {}, found {:?}", expected, found),
            ParseErrorKind::UnknownOperator(k) => write!(f, "unknown operator {:?}", k),
            ParseErrorKind::IdentifierExpected => write!(f, "identifier expected"),
            ParseErrorKind::MissingInitExpression => write!(f, "'val' requires an initializer"),
            ParseErrorKind::SemicolonExpected => write!(f, "';' expected"),
            ParseErrorKind::AssignExpected => write!(f, "'=' expected"),
            ParseErrorKind::CommaExpected => write!(f, "',' expected"),
            ParseErrorKind::CommaOrCloseParenExpected => write!(f, "',' or ')' expected"),
            ParseErrorKind::DuplicateDefinition(name) => write!(f, "duplicate definition of '{}'", name),
            ParseErrorKind::UndefinedSymbol(name) => write!(f, "undefined symbol '{}'", name),
            ParseErrorKind::CannotModifyConst(name) => write!(f, "cannot modify const '{}'", name),
            ParseErrorKind::OpenParenExpected => write!(f, "'(' expected"),
            ParseErrorKind::CloseParenExpected => write!(f, "')' expected"),
            ParseErrorKind::OpenBraceExpected => write!(f, "'{{' expected"),
            ParseErrorKind::CloseBraceExpected => write!(f, "'}}' expected"),
            ParseErrorKind::InvalidStatement => write!(f, "invalid statement"),
            ParseErrorKind::ConditionExpressionExpected => write!(f, "condition expression expected"),
            ParseErrorKind::BreakContinueNoLoop => write!(f, "break/continue/breakout outside of loop"),
            ParseErrorKind::ExpressionOrVarExpected => write!(f, "expression or 'var' expected"),
            ParseErrorKind::IllegalExpression => write!(f, "illegal expression"),
            ParseErrorKind::TooManyFunctionArgs(n) => write!(f, "too many function arguments ({} > 63)", n),
            ParseErrorKind::InvalidLhs => write!(f, "invalid assignment target"),
            ParseErrorKind::UnexpectedToken(k) => write!(f, "unexpected token {:?}", k),
            ParseErrorKind::IllegalThis => write!(f, "'this' outside of a method"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
    pub span: Span,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self { kind, message: message.into(), span }
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RuntimeError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    TypeMismatch,
    CannotConvertToInteger,
    CannotConvertToBoolean,
    CannotConvertToReal,
    DivisionByZero,
    IndexOutOfRange,
    IndexerNotSupported,
    UnknownOperator,
    UnknownIdentifier,
    UnknownMember,
    MethodNotFound,
    NoMatchingConstructor,
    WrongNumberArguments,
    TooManyArguments,
    TooFewArguments,
    DuplicateDefinition,
    DuplicateName,
    InvalidType,
    MultipleSymbols,
    StackOverflow,
    AssertFailed,
}

/// Sentinel kinds carried by value-level `Error` values, distinct from the
/// fatal `RuntimeError` surface above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    OutOfMemory,
    DivideByZero,
    TypeMismatch,
    DuplicateName,
    UndefinedSymbol,
    Parse,
    CollectionEnd,
    Unspecified,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Span;

    #[test]
    fn parse_error_has_span() {
        let error = ParseError {
            kind: ParseErrorKind::SemicolonExpected,
            span: Span::new(5, 10, 1, 6),
        };
        assert_eq!(error.span.start, 5);
        assert_eq!(error.span.end, 10);
    }

    #[test]
    fn display_with_source_shows_line_and_underline() {
        let error = ParseError {
            kind: ParseErrorKind::SemicolonExpected,
            span: Span::new(8, 14, 1, 9),
        };
        let source = "var x = mortal";
        let display = error.display_with_source(source);
        assert!(display.contains("mortal"), "{}", display);
        assert!(display.contains("^^^^^^"), "{}", display);
    }

    #[test]
    fn display_with_source_has_color_codes() {
        let error = ParseError {
            kind: ParseErrorKind::SemicolonExpected,
            span: Span::new(0, 3, 1, 1),
        };
        let display = error.display_with_source("var x = 1");
        assert!(display.contains("\x1b["));
    }
}
