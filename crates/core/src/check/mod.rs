//! The conformance check tree.
//!
//! A check is either a leaf that validates one message of one recorded
//! exchange, a fixed verdict, or a group whose children are built lazily on
//! first evaluation. Checks hold no mutable state besides that one-time
//! child list, so evaluating the same traffic twice gives identical results.

mod leaves;
mod schema;

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use uuid::Uuid;

use crate::report::ConformanceStatus;
use crate::traffic::{ConformanceExchange, HttpMessageType, TrafficRecorder};

pub use leaves::*;
pub use schema::{JsonSchemaValidator, SchemaCache};

pub type Violations = BTreeSet<String>;

pub type RolePredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

type Validator = Arc<dyn Fn(&ConformanceExchange) -> Violations + Send + Sync>;

type ChildFactory = Arc<dyn Fn() -> Vec<ConformanceCheck> + Send + Sync>;

enum CheckKind {
    Leaf {
        exchange_uuid: Option<Uuid>,
        message_type: HttpMessageType,
        validate: Validator,
    },
    Verdict(Violations),
    Group {
        factory: ChildFactory,
        children: OnceLock<Vec<ConformanceCheck>>,
    },
}

pub struct ConformanceCheck {
    title: String,
    applies_to: Option<RolePredicate>,
    kind: CheckKind,
}

/// Result of evaluating a check for one role.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub title: String,
    pub status: ConformanceStatus,
    /// Own violations for leaves, the union of the children's for groups.
    pub violations: Violations,
    pub children: Vec<CheckOutcome>,
}

impl ConformanceCheck {
    /// A leaf validating one message of one exchange. Without an exchange
    /// the leaf evaluates to `NO_TRAFFIC`.
    pub fn leaf<F>(
        title: impl Into<String>,
        exchange_uuid: Option<Uuid>,
        message_type: HttpMessageType,
        validate: F,
    ) -> Self
    where
        F: Fn(&ConformanceExchange) -> Violations + Send + Sync + 'static,
    {
        Self {
            title: title.into(),
            applies_to: None,
            kind: CheckKind::Leaf {
                exchange_uuid,
                message_type,
                validate: Arc::new(validate),
            },
        }
    }

    /// A check that always fails with `message`.
    pub fn failure(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            applies_to: None,
            kind: CheckKind::Verdict(BTreeSet::from([message.into()])),
        }
    }

    /// A group whose children are produced on first evaluation.
    pub fn lazy_group<F>(title: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Vec<ConformanceCheck> + Send + Sync + 'static,
    {
        Self {
            title: title.into(),
            applies_to: None,
            kind: CheckKind::Group {
                factory: Arc::new(factory),
                children: OnceLock::new(),
            },
        }
    }

    /// A group with children known up front.
    pub fn group(title: impl Into<String>, children: Vec<ConformanceCheck>) -> Self {
        let built = OnceLock::new();
        let _ = built.set(children);
        let factory: ChildFactory = Arc::new(Vec::<ConformanceCheck>::new);
        Self {
            title: title.into(),
            applies_to: None,
            kind: CheckKind::Group {
                factory,
                children: built,
            },
        }
    }

    /// Restrict the check to roles accepted by `predicate`.
    pub fn for_roles<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.applies_to = Some(Arc::new(predicate));
        self
    }

    /// Restrict the check to a single role.
    pub fn for_role(self, role: &str) -> Self {
        let role = role.to_string();
        self.for_roles(move |r| r == role)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// The message direction a leaf inspects.
    pub fn message_type(&self) -> Option<HttpMessageType> {
        match &self.kind {
            CheckKind::Leaf { message_type, .. } => Some(*message_type),
            _ => None,
        }
    }

    pub fn is_relevant_for_role(&self, role: &str) -> bool {
        self.applies_to.as_ref().map_or(true, |p| p(role))
    }

    pub fn children(&self) -> &[ConformanceCheck] {
        match &self.kind {
            CheckKind::Group { factory, children } => children.get_or_init(|| factory()),
            _ => &[],
        }
    }

    /// Evaluate for `role` against the recorded traffic. Returns `None` when
    /// the check is not relevant for the role.
    pub fn evaluate(&self, role: &str, traffic: &TrafficRecorder) -> Option<CheckOutcome> {
        if !self.is_relevant_for_role(role) {
            return None;
        }
        let outcome = match &self.kind {
            CheckKind::Leaf {
                exchange_uuid,
                message_type: _,
                validate,
            } => match exchange_uuid.and_then(|uuid| traffic.get(&uuid)) {
                None => self.outcome(ConformanceStatus::NoTraffic, Violations::new(), Vec::new()),
                Some(exchange) => {
                    let violations = validate(exchange);
                    let status = if violations.is_empty() {
                        ConformanceStatus::Conformant
                    } else {
                        ConformanceStatus::NonConformant
                    };
                    self.outcome(status, violations, Vec::new())
                }
            },
            CheckKind::Verdict(violations) => self.outcome(
                ConformanceStatus::NonConformant,
                violations.clone(),
                Vec::new(),
            ),
            CheckKind::Group { .. } => {
                let children: Vec<CheckOutcome> = self
                    .children()
                    .iter()
                    .filter_map(|child| child.evaluate(role, traffic))
                    .collect();
                let status = ConformanceStatus::reduce(children.iter().map(|c| c.status));
                let violations = children
                    .iter()
                    .flat_map(|c| c.violations.iter().cloned())
                    .collect();
                self.outcome(status, violations, children)
            }
        };
        Some(outcome)
    }

    fn outcome(
        &self,
        status: ConformanceStatus,
        violations: Violations,
        children: Vec<CheckOutcome>,
    ) -> CheckOutcome {
        CheckOutcome {
            title: self.title.clone(),
            status,
            violations,
            children,
        }
    }
}
