use std::{cell::RefCell, rc::Rc};

use crate::{
    ast::{Expression, InfixOperator, Program, Statement},
    observer::{Observer, Silent},
    span::Span,
    tokenizer::{Token, TokenType, TokenizeErrorKind, Tokenizer},
};

#[derive(Debug)]
pub struct ParseErrors(Vec<ParseErrorWithContext>);

impl ParseErrors {
    pub fn errors(&self) -> &[ParseErrorWithContext] {
        &self.0
    }

    pub fn into_errors(self) -> Vec<ParseErrorWithContext> {
        self.0
    }
}

impl std::error::Error for ParseErrors {}

impl std::fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Found {} errors during parsing", self.0.len())?;
        for error in &self.0 {
            writeln!(f, "{}", error)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ParseErrorWithContext {
    pub error: ParseError,
    pub span: Span,
    context: Vec<&'static str>,
}

impl ParseErrorWithContext {
    /// Grammar rules that were being parsed, outermost first.
    pub fn context(&self) -> &[&'static str] {
        &self.context
    }
}

impl std::fmt::Display for ParseErrorWithContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "While parsing {}", self.context.join(" > "))?;
        write!(f, "{} at {}", self.error, self.span)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Expected \"{expected}\" but found \"{found}\"")]
    Expected {
        expected: TokenType,
        found: TokenType,
    },
    #[error("Expected one of {} but found \"{found}\"", one_of(.expected))]
    ExpectedOneOf {
        expected: &'static [TokenType],
        found: TokenType,
    },
    #[error("Unexpected \"{0}\" in expression")]
    UnexpectedToken(TokenType),
    #[error("\"{0}\" does not start a statement")]
    UnknownStatement(TokenType),
    #[error("Expression nested more than {0} levels deep")]
    TooDeeplyNested(usize),
    #[error(transparent)]
    Tokenize(#[from] TokenizeErrorKind),
}

fn one_of(expected: &[TokenType]) -> String {
    expected
        .iter()
        .map(|token_type| format!("\"{token_type}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Upper bound on the height of an expression tree. Every open parenthesis
/// and every operator of an unfinished chain counts one level, which keeps
/// parsing and evaluation recursion bounded.
pub const MAX_EXPRESSION_DEPTH: usize = 128;

#[derive(Debug, Clone)]
struct ParseContext {
    stack: Rc<RefCell<Vec<&'static str>>>,
}

impl ParseContext {
    fn new() -> Self {
        Self {
            stack: Rc::new(RefCell::new(Vec::new())),
        }
    }

    fn push(&self, name: &'static str) -> ParseContextGuard {
        self.stack.borrow_mut().push(name);
        ParseContextGuard::new(self.clone())
    }

    fn pop(&self) {
        self.stack.borrow_mut().pop();
    }

    fn snapshot(&self) -> Vec<&'static str> {
        self.stack.borrow().clone()
    }
}

struct ParseContextGuard {
    context: ParseContext,
}

impl ParseContextGuard {
    fn new(context: ParseContext) -> Self {
        Self { context }
    }
}

impl Drop for ParseContextGuard {
    fn drop(&mut self) {
        self.context.pop();
    }
}

pub fn program(source: &str) -> Result<Program, ParseErrors> {
    program_with_observer(source, Silent::shared())
}

pub fn program_with_observer(
    source: &str,
    observer: Rc<RefCell<dyn Observer>>,
) -> Result<Program, ParseErrors> {
    Parser::new(source, observer).program()
}

type ParseResult<T> = Result<T, ParseErrorWithContext>;

struct Parser<'a> {
    tokenizer: Tokenizer<'a>,
    current: Token<'a>,
    context: ParseContext,
    depth: usize,
    errors: Vec<ParseErrorWithContext>,
    observer: Rc<RefCell<dyn Observer>>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, observer: Rc<RefCell<dyn Observer>>) -> Self {
        Self {
            tokenizer: Tokenizer::new(source),
            current: Token {
                token_type: TokenType::Eof,
                lexeme: "",
                span: Span::default(),
            },
            context: ParseContext::new(),
            depth: 0,
            errors: Vec::new(),
            observer,
        }
    }

    fn program(mut self) -> Result<Program, ParseErrors> {
        let _guard = self.context.push("program");
        self.advance();

        let mut statements = Vec::new();
        while !self.check(TokenType::Eof) {
            match self.statement() {
                Ok(statement) => {
                    self.observer.borrow_mut().statement_parsed(&statement);
                    statements.push(statement);
                }
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                    // A stray '}' has no block to close at the top level.
                    if self.check(TokenType::RightBrace) {
                        self.advance();
                    }
                }
            }
        }

        if !self.errors.is_empty() {
            return Err(ParseErrors(self.errors));
        }

        Ok(Program(statements))
    }

    /// Moves to the next token and returns the one that was current.
    /// Lexical errors are recorded and skipped.
    fn advance(&mut self) -> Token<'a> {
        loop {
            match self.tokenizer.token() {
                Ok(token) => {
                    self.observer.borrow_mut().token(&token);
                    return std::mem::replace(&mut self.current, token);
                }
                Err(e) => {
                    let error = self.error_at(ParseError::Tokenize(e.kind), e.span);
                    self.errors.push(error);
                }
            }
        }
    }

    fn check(&self, token_type: TokenType) -> bool {
        self.current.token_type == token_type
    }

    fn consume(&mut self, token_type: TokenType) -> ParseResult<Token<'a>> {
        if self.check(token_type) {
            Ok(self.advance())
        } else {
            Err(self.error(ParseError::Expected {
                expected: token_type,
                found: self.current.token_type,
            }))
        }
    }

    fn error(&self, error: ParseError) -> ParseErrorWithContext {
        self.error_at(error, self.current.span.clone())
    }

    fn error_at(&self, error: ParseError, span: Span) -> ParseErrorWithContext {
        ParseErrorWithContext {
            error,
            span,
            context: self.context.snapshot(),
        }
    }

    /// Skips to just after the next `;` or up to the next `}` at the same
    /// nesting level, whichever comes first.
    fn synchronize(&mut self) {
        // Expressions never span statements.
        self.depth = 0;

        let mut depth = 0usize;
        loop {
            match self.current.token_type {
                TokenType::Eof => return,
                TokenType::Semicolon if depth == 0 => {
                    self.advance();
                    return;
                }
                TokenType::RightBrace if depth == 0 => return,
                TokenType::RightBrace => {
                    depth -= 1;
                    self.advance();
                    if depth == 0 {
                        return;
                    }
                }
                TokenType::LeftBrace => {
                    depth += 1;
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn statement(&mut self) -> ParseResult<Statement> {
        let _guard = self.context.push("statement");
        match self.current.token_type {
            TokenType::Identifier => self.assign_statement(),
            TokenType::Print => self.print_statement(),
            TokenType::If => self.if_statement(),
            TokenType::While => self.while_statement(),
            TokenType::LeftBrace => Ok(Statement::Block(self.block()?)),
            token_type => Err(self.error(ParseError::UnknownStatement(token_type))),
        }
    }

    fn assign_statement(&mut self) -> ParseResult<Statement> {
        let _guard = self.context.push("assign_statement");
        let name = self.consume(TokenType::Identifier)?.lexeme.to_string();
        self.consume(TokenType::Equal)?;
        let expr = self.expression()?;
        self.consume(TokenType::Semicolon)?;
        Ok(Statement::Assign(name, expr))
    }

    fn print_statement(&mut self) -> ParseResult<Statement> {
        let _guard = self.context.push("print_statement");
        self.consume(TokenType::Print)?;
        let argument = match self.current.token_type {
            TokenType::Identifier => Some(Expression::Identifier(
                self.advance().lexeme.to_string(),
            )),
            TokenType::String => Some(Expression::String(
                self.advance().string_contents().to_string(),
            )),
            TokenType::Semicolon => None,
            found => {
                return Err(self.error(ParseError::ExpectedOneOf {
                    expected: &[
                        TokenType::Identifier,
                        TokenType::String,
                        TokenType::Semicolon,
                    ],
                    found,
                }))
            }
        };
        self.consume(TokenType::Semicolon)?;
        Ok(Statement::Print(argument))
    }

    fn if_statement(&mut self) -> ParseResult<Statement> {
        let _guard = self.context.push("if_statement");
        self.consume(TokenType::If)?;
        let condition = self.parenthesized()?;
        let then_branch = self.block()?;
        let else_branch = if self.check(TokenType::Else) {
            self.advance();
            Some(self.block()?)
        } else {
            None
        };
        Ok(Statement::If(condition, then_branch, else_branch))
    }

    fn while_statement(&mut self) -> ParseResult<Statement> {
        let _guard = self.context.push("while_statement");
        self.consume(TokenType::While)?;
        let condition = self.parenthesized()?;
        let body = self.block()?;
        Ok(Statement::While(condition, body))
    }

    fn parenthesized(&mut self) -> ParseResult<Expression> {
        self.nest()?;
        self.consume(TokenType::LeftParen)?;
        let expr = self.expression()?;
        self.consume(TokenType::RightParen)?;
        self.depth -= 1;
        Ok(expr)
    }

    /// Enters one more expression level, failing at the current token once
    /// `MAX_EXPRESSION_DEPTH` is reached.
    fn nest(&mut self) -> ParseResult<()> {
        if self.depth >= MAX_EXPRESSION_DEPTH {
            return Err(self.error(ParseError::TooDeeplyNested(MAX_EXPRESSION_DEPTH)));
        }
        self.depth += 1;
        Ok(())
    }

    fn block(&mut self) -> ParseResult<Vec<Statement>> {
        let _guard = self.context.push("block");
        self.consume(TokenType::LeftBrace)?;

        let mut statements = Vec::new();
        loop {
            match self.current.token_type {
                TokenType::RightBrace => {
                    self.advance();
                    return Ok(statements);
                }
                TokenType::Eof => {
                    return Err(self.error(ParseError::Expected {
                        expected: TokenType::RightBrace,
                        found: TokenType::Eof,
                    }))
                }
                _ => match self.statement() {
                    Ok(statement) => statements.push(statement),
                    Err(err) => {
                        self.errors.push(err);
                        self.synchronize();
                    }
                },
            }
        }
    }

    fn expression(&mut self) -> ParseResult<Expression> {
        let _guard = self.context.push("expression");
        self.comparison()
    }

    fn binary(
        &mut self,
        operand: fn(&mut Self) -> ParseResult<Expression>,
        operator: fn(TokenType) -> Option<InfixOperator>,
    ) -> ParseResult<Expression> {
        let mut expr = operand(self)?;
        let mut nested = 0;

        while let Some(op) = operator(self.current.token_type) {
            self.nest()?;
            nested += 1;
            let span = self.advance().span;
            let right = operand(self)?;
            expr = Expression::Binary {
                left: Box::new(expr),
                operator: op,
                right: Box::new(right),
                span,
            };
        }

        self.depth -= nested;
        Ok(expr)
    }

    fn comparison(&mut self) -> ParseResult<Expression> {
        let _guard = self.context.push("comparison");
        self.binary(Self::term, |token_type| match token_type {
            TokenType::EqualEqual => Some(InfixOperator::Equal),
            TokenType::LessEqual => Some(InfixOperator::LessThanOrEqual),
            _ => None,
        })
    }

    fn term(&mut self) -> ParseResult<Expression> {
        let _guard = self.context.push("term");
        self.binary(Self::factor, |token_type| match token_type {
            TokenType::Plus => Some(InfixOperator::Plus),
            TokenType::Minus => Some(InfixOperator::Minus),
            _ => None,
        })
    }

    fn factor(&mut self) -> ParseResult<Expression> {
        let _guard = self.context.push("factor");
        self.binary(Self::primary, |token_type| match token_type {
            TokenType::Star => Some(InfixOperator::Multiply),
            TokenType::Slash => Some(InfixOperator::Divide),
            TokenType::Percent => Some(InfixOperator::Modulo),
            _ => None,
        })
    }

    fn primary(&mut self) -> ParseResult<Expression> {
        let _guard = self.context.push("primary");
        match self.current.token_type {
            TokenType::Number => Ok(Expression::Number(parse_number(self.advance().lexeme))),
            TokenType::Identifier => Ok(Expression::Identifier(
                self.advance().lexeme.to_string(),
            )),
            TokenType::String => Ok(Expression::String(
                self.advance().string_contents().to_string(),
            )),
            TokenType::LeftParen => self.parenthesized(),
            token_type => Err(self.error(ParseError::UnexpectedToken(token_type))),
        }
    }
}

/// Digits only; values past `i64::MAX` wrap.
fn parse_number(digits: &str) -> i64 {
    digits.bytes().fold(0i64, |acc, digit| {
        acc.wrapping_mul(10)
            .wrapping_add(i64::from(digit - b'0'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> String {
        program(source)
            .expect("Parse should work on valid program")
            .to_string()
    }

    fn parse_errors(source: &str) -> Vec<ParseErrorWithContext> {
        program(source)
            .expect_err("Parse should fail on invalid program")
            .into_errors()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(parse("x = 1 + 2 * 3;"), "x = (+ 1 (* 2 3));\n");
        assert_eq!(
            parse("x = a + 1 <= b * 2;"),
            "x = (<= (+ a 1) (* b 2));\n"
        );
        assert_eq!(parse("x = a % 3 == 0;"), "x = (== (% a 3) 0);\n");
    }

    #[test]
    fn test_left_associative() {
        assert_eq!(parse("x = 1 - 2 - 3;"), "x = (- (- 1 2) 3);\n");
        assert_eq!(parse("x = 8 / 4 % 3 * 2;"), "x = (* (% (/ 8 4) 3) 2);\n");
        assert_eq!(parse("x = a == b == c;"), "x = (== (== a b) c);\n");
    }

    #[test]
    fn test_grouping() {
        assert_eq!(parse("x = (1 + 2) * 3;"), "x = (* (+ 1 2) 3);\n");
        assert_eq!(parse("x = ((y));"), "x = y;\n");
    }

    #[test]
    fn test_statements() {
        let source = r#"
        i = 1;
        while (i <= 3) {
            if (i == 2) { print "two"; } else { print i; }
            i = i + 1;
        }
        { print; }
        "#;
        let expected = "i = 1;\n\
            while ((<= i 3)) { if ((== i 2)) { print \"two\"; } else { print i; } i = (+ i 1); }\n\
            { print; }\n";
        assert_eq!(parse(source), expected);
    }

    #[test]
    fn test_if_without_else() {
        let program = program("if (x) { y = 1; }").unwrap();
        assert_eq!(
            program.0,
            vec![Statement::If(
                Expression::Identifier("x".to_string()),
                vec![Statement::Assign("y".to_string(), Expression::Number(1))],
                None,
            )]
        );
    }

    #[test]
    fn test_binary_span_is_operator() {
        let program = program("x = 10 / y;").unwrap();
        let Statement::Assign(_, Expression::Binary { span, .. }) = &program.0[0] else {
            panic!("expected a binary assignment");
        };
        assert_eq!(span.start_column, 8);
        assert_eq!(span.end_column, 9);
    }

    #[test]
    fn test_large_number_wraps() {
        assert_eq!(parse_number("9223372036854775808"), i64::MIN);
        assert_eq!(parse_number("007"), 7);
    }

    #[test]
    fn test_print_only_accepts_identifier_or_string() {
        let errors = parse_errors("print 1 + 2;");
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            errors[0].error,
            ParseError::ExpectedOneOf {
                found: TokenType::Number,
                ..
            }
        ));
        assert_eq!(errors[0].span.start_column, 7);
    }

    #[test]
    fn test_unknown_statement_does_not_truncate() {
        let errors = parse_errors("x = 1;\n5;\ny = 2;\nprint y");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].error, ParseError::UnknownStatement(TokenType::Number));
        assert_eq!(errors[0].span.start_line, 2);
        assert_eq!(
            errors[1].error,
            ParseError::Expected {
                expected: TokenType::Semicolon,
                found: TokenType::Eof,
            }
        );
        assert_eq!(errors[1].span.start_line, 4);
    }

    #[test]
    fn test_missing_closing_brace() {
        let errors = parse_errors("while (1 <= 2) { print x;");
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].error,
            ParseError::Expected {
                expected: TokenType::RightBrace,
                found: TokenType::Eof,
            }
        );
    }

    #[test]
    fn test_stray_right_brace() {
        let errors = parse_errors("} x = 1;");
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].error,
            ParseError::UnknownStatement(TokenType::RightBrace)
        );
    }

    #[test]
    fn test_recovers_inside_block() {
        let errors = parse_errors("if (x) { print 5; y = ; } z = 1 z;");
        let found: Vec<_> = errors.iter().map(|e| e.span.start_column).collect();
        assert_eq!(found, vec![16, 23, 33]);
    }

    #[test]
    fn test_missing_parens_skip_whole_block() {
        let errors = parse_errors("if x { print x; } print x;");
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].error,
            ParseError::Expected {
                expected: TokenType::LeftParen,
                found: TokenType::Identifier,
            }
        );
    }

    #[test]
    fn test_error_context() {
        let errors = parse_errors("if (1) { print 5; }");
        assert_eq!(
            errors[0].context(),
            &[
                "program",
                "statement",
                "if_statement",
                "block",
                "statement",
                "print_statement"
            ]
        );
        assert!(errors[0]
            .to_string()
            .starts_with("While parsing program > statement > if_statement"));
    }

    #[test]
    fn test_lexical_errors_are_reported() {
        let errors = parse_errors("x = 1 # 2;");
        assert_eq!(
            errors[0].error,
            ParseError::Tokenize(TokenizeErrorKind::UnexpectedCharacter('#'))
        );
        assert_eq!(errors[0].span.start_column, 7);

        let errors = parse_errors("print \"never closed;");
        assert_eq!(
            errors[0].error,
            ParseError::Tokenize(TokenizeErrorKind::UnterminatedString)
        );
        assert_eq!(errors[0].span.start_column, 7);
    }

    #[test]
    fn test_bare_less_is_rejected() {
        let errors = parse_errors("if (i < 5) { print i; }");
        assert_eq!(
            errors[0].error,
            ParseError::Tokenize(TokenizeErrorKind::UnsupportedOperator('<'))
        );
    }

    #[test]
    fn test_expected_one_of_message() {
        let errors = parse_errors("print 5;");
        assert_eq!(
            errors[0].error.to_string(),
            "Expected one of \"identifier\", \"string\", \";\" but found \"number\""
        );
    }

    fn chain(terms: usize) -> String {
        format!("x = 1{};", " + 1".repeat(terms - 1))
    }

    fn nested_parens(levels: usize) -> String {
        format!("x = {}1{};", "(".repeat(levels), ")".repeat(levels))
    }

    #[test]
    fn test_nesting_within_limit() {
        program(&chain(MAX_EXPRESSION_DEPTH)).expect("Chain within the limit should parse");
        assert_eq!(parse(&nested_parens(MAX_EXPRESSION_DEPTH)), "x = 1;\n");
    }

    #[test]
    fn test_long_chain_is_rejected() {
        let errors = parse_errors(&format!("{} print x;", chain(10_000)));
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].error,
            ParseError::TooDeeplyNested(MAX_EXPRESSION_DEPTH)
        );
        // The first operator past the limit.
        assert_eq!(errors[0].span.start_column, 7 + 4 * MAX_EXPRESSION_DEPTH);
    }

    #[test]
    fn test_deep_parens_are_rejected() {
        let errors = parse_errors(&format!("{} print x;", nested_parens(2_000)));
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].error,
            ParseError::TooDeeplyNested(MAX_EXPRESSION_DEPTH)
        );
        assert_eq!(errors[0].span.start_column, 5 + MAX_EXPRESSION_DEPTH);
    }

    #[test]
    fn test_nesting_resets_between_statements() {
        let source = format!("{} {}", chain(100), chain(100));
        assert_eq!(program(&source).expect("Parse should work").0.len(), 2);

        let source = format!("{} {}", chain(10_000), chain(100));
        assert_eq!(parse_errors(&source).len(), 1);
    }
}
