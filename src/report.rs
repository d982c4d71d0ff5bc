use std::{cell::RefCell, rc::Rc};

use crate::{
    diagnostic::Diagnostic,
    observer::{Observer, Silent},
    parser,
    tree_walk_interpreter::Interpreter,
};

#[derive(Default, Clone)]
pub struct Options {
    pub step_limit: Option<u64>,
    pub observer: Option<Rc<RefCell<dyn Observer>>>,
}

/// Everything a caller learns from running a program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    /// Printed lines, without their terminators.
    pub output: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Report {
    pub fn is_success(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Tokenizes, parses and runs `source`. Nothing runs if parsing reported
/// any error; output printed before a runtime error is kept.
pub fn run(source: &str, options: &Options) -> Report {
    let observer = options.observer.clone().unwrap_or_else(Silent::shared);
    let mut report = Report::default();

    match parser::program_with_observer(source, observer.clone()) {
        Ok(program) => {
            let output = Rc::new(RefCell::new(Vec::<u8>::new()));
            let mut interpreter = Interpreter::new(output.clone())
                .with_observer(observer.clone())
                .with_step_limit(options.step_limit);

            if let Err(e) = interpreter.interpret(&program) {
                report.diagnostics.push(Diagnostic::from(&e));
            }

            report.output = String::from_utf8_lossy(&output.borrow())
                .lines()
                .map(str::to_string)
                .collect();
        }
        Err(errors) => {
            report
                .diagnostics
                .extend(errors.errors().iter().map(Diagnostic::from));
        }
    }

    for diagnostic in &report.diagnostics {
        observer.borrow_mut().diagnostic(diagnostic);
    }

    report
}
