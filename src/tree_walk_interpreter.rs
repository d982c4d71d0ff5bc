mod variables;

use std::{cell::RefCell, fmt::Debug, rc::Rc};

use crate::{
    ast::{Expression, InfixOperator, Program, Statement},
    observer::{Observer, Silent},
    span::Span,
};

pub use self::variables::Variables;

pub struct Interpreter {
    variables: Variables,
    stdout: Rc<RefCell<dyn std::io::Write>>,
    observer: Rc<RefCell<dyn Observer>>,
    step_limit: Option<u64>,
    steps: u64,
}

impl Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("variables", &self.variables)
            .field("step_limit", &self.step_limit)
            .field("steps", &self.steps)
            .finish()
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Rc::new(RefCell::new(std::io::stdout())))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Error executing statement: {current_statement} - {kind}")]
    Execution {
        kind: ExecutionErrorKind,
        current_statement: Statement,
    },
}

impl ExecutionError {
    pub fn kind(&self) -> &ExecutionErrorKind {
        match self {
            ExecutionError::Execution { kind, .. } => kind,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionErrorKind {
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("Division by zero")]
    DivisionByZero(Span),
    #[error("Remainder by zero")]
    RemainderByZero(Span),
    #[error("Step limit of {0} exceeded")]
    StepLimitExceeded(u64),
}

impl ExecutionErrorKind {
    pub fn span(&self) -> Option<&Span> {
        match self {
            ExecutionErrorKind::DivisionByZero(span)
            | ExecutionErrorKind::RemainderByZero(span) => Some(span),
            ExecutionErrorKind::IO(_) | ExecutionErrorKind::StepLimitExceeded(_) => None,
        }
    }
}

impl Interpreter {
    pub fn new(stdout: Rc<RefCell<dyn std::io::Write>>) -> Self {
        Self {
            variables: Variables::new(),
            stdout,
            observer: Silent::shared(),
            step_limit: None,
            steps: 0,
        }
    }

    pub fn with_observer(mut self, observer: Rc<RefCell<dyn Observer>>) -> Self {
        self.observer = observer;
        self
    }

    /// Caps how many statements and loop iterations a single `interpret`
    /// call may run. `None` means no cap.
    pub fn with_step_limit(mut self, step_limit: Option<u64>) -> Self {
        self.step_limit = step_limit;
        self
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn interpret(&mut self, program: &Program) -> Result<(), ExecutionError> {
        self.steps = 0;
        for stmt in program.0.iter() {
            if let Err(kind) = self.execute(stmt) {
                return Err(ExecutionError::Execution {
                    kind,
                    current_statement: stmt.clone(),
                });
            }
        }

        Ok(())
    }

    fn execute_all(&mut self, statements: &[Statement]) -> Result<(), ExecutionErrorKind> {
        statements.iter().try_for_each(|stmt| self.execute(stmt))
    }

    fn execute(&mut self, stmt: &Statement) -> Result<(), ExecutionErrorKind> {
        self.step()?;

        match stmt {
            Statement::Assign(name, expression) => {
                let value = self.evaluate(expression)?;
                self.variables.set(name, value);
                self.observer.borrow_mut().assigned(name, value);
            }
            Statement::Print(argument) => match argument {
                None => {}
                Some(Expression::String(text)) => writeln!(self.stdout.borrow_mut(), "{}", text)?,
                Some(expression) => {
                    let value = self.evaluate(expression)?;
                    writeln!(self.stdout.borrow_mut(), "{}", value)?;
                }
            },
            Statement::If(condition, then_branch, else_branch) => {
                if self.evaluate(condition)? != 0 {
                    self.execute_all(then_branch)?;
                } else if let Some(else_branch) = else_branch {
                    self.execute_all(else_branch)?;
                }
            }
            Statement::While(condition, body) => {
                while self.evaluate(condition)? != 0 {
                    self.step()?;
                    self.execute_all(body)?;
                }
            }
            Statement::Block(statements) => self.execute_all(statements)?,
        }

        self.observer.borrow_mut().statement_executed(stmt);
        Ok(())
    }

    fn step(&mut self) -> Result<(), ExecutionErrorKind> {
        self.steps += 1;
        match self.step_limit {
            Some(limit) if self.steps > limit => Err(ExecutionErrorKind::StepLimitExceeded(limit)),
            _ => Ok(()),
        }
    }

    fn evaluate(&self, expression: &Expression) -> Result<i64, ExecutionErrorKind> {
        let value = match expression {
            Expression::Number(n) => *n,
            // Strings only mean something to `print`.
            Expression::String(_) => 0,
            Expression::Identifier(name) => self.variables.get(name),
            Expression::Binary {
                left,
                operator,
                right,
                span,
            } => {
                let a = self.evaluate(left)?;
                let b = self.evaluate(right)?;
                match operator {
                    InfixOperator::Equal => i64::from(a == b),
                    InfixOperator::LessThanOrEqual => i64::from(a <= b),
                    InfixOperator::Plus => a.wrapping_add(b),
                    InfixOperator::Minus => a.wrapping_sub(b),
                    InfixOperator::Multiply => a.wrapping_mul(b),
                    InfixOperator::Divide => {
                        if b == 0 {
                            return Err(ExecutionErrorKind::DivisionByZero(span.clone()));
                        }
                        a.wrapping_div(b)
                    }
                    InfixOperator::Modulo => {
                        if b == 0 {
                            return Err(ExecutionErrorKind::RemainderByZero(span.clone()));
                        }
                        a.wrapping_rem(b)
                    }
                }
            }
        };

        Ok(value)
    }
}
