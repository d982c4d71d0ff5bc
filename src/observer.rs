//! Optional sink for pipeline events.
//!
//! The parser and the interpreter report what they do to an [`Observer`].
//! The default is [`Silent`], so nothing is printed unless the host asks for
//! it. [`Tracing`] forwards every event to the `tracing` crate.

use std::{cell::RefCell, rc::Rc};

use crate::{ast::Statement, diagnostic::Diagnostic, tokenizer::Token};

pub trait Observer {
    fn token(&mut self, _token: &Token<'_>) {}

    fn statement_parsed(&mut self, _statement: &Statement) {}

    fn statement_executed(&mut self, _statement: &Statement) {}

    fn assigned(&mut self, _name: &str, _value: i64) {}

    fn diagnostic(&mut self, _diagnostic: &Diagnostic) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Observer for Silent {}

#[derive(Debug, Default, Clone, Copy)]
pub struct Tracing;

impl Observer for Tracing {
    fn token(&mut self, token: &Token<'_>) {
        tracing::trace!(
            token_type = %token.token_type,
            lexeme = token.lexeme,
            at = %token.span,
            "token"
        );
    }

    fn statement_parsed(&mut self, statement: &Statement) {
        tracing::trace!(%statement, "parsed");
    }

    fn statement_executed(&mut self, statement: &Statement) {
        tracing::trace!(%statement, "executed");
    }

    fn assigned(&mut self, name: &str, value: i64) {
        tracing::debug!(name, value, "assigned");
    }

    fn diagnostic(&mut self, diagnostic: &Diagnostic) {
        tracing::warn!(kind = %diagnostic.kind, "{}", diagnostic.message);
    }
}

impl Silent {
    pub fn shared() -> Rc<RefCell<dyn Observer>> {
        Rc::new(RefCell::new(Silent))
    }
}

impl Tracing {
    pub fn shared() -> Rc<RefCell<dyn Observer>> {
        Rc::new(RefCell::new(Tracing))
    }
}
