//! Completeness-ordered routing
//!
//! The next agent is derived from which context fields are still unset,
//! checked in a fixed order. There is no stored step pointer: the same
//! context and message always produce the same route.

use crate::classifier::MessageClassifier;
use crate::context::{AgentKind, Context};
use crate::models::Currency;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Dispatch(AgentKind),
    /// Everything is set and no re-run was asked for
    Direct,
}

struct Rule {
    agent: AgentKind,
    pending: fn(&Context) -> bool,
}

/// First pending rule wins. Each predicate stays false once satisfied
/// because patches can set fields but never clear them.
const RULES: &[Rule] = &[
    Rule {
        agent: AgentKind::Currency,
        pending: |c: &Context| c.currency.is_none(),
    },
    Rule {
        agent: AgentKind::Geography,
        pending: |c: &Context| {
            c.currency == Some(Currency::Usd) && c.geography_constraints.is_empty()
        },
    },
    Rule {
        agent: AgentKind::RiskAssessment,
        pending: |c: &Context| c.risk_bucket.is_none(),
    },
    Rule {
        agent: AgentKind::SubRisk,
        pending: |c: &Context| c.sub_risk_targets.is_none(),
    },
    Rule {
        agent: AgentKind::FundSelection,
        pending: |c: &Context| c.selected_funds.is_empty(),
    },
    Rule {
        agent: AgentKind::Optimization,
        pending: |c: &Context| c.optimization_result.is_none(),
    },
];

/// The agent whose field is the first one still missing
pub fn next_pending(context: &Context) -> Option<AgentKind> {
    RULES
        .iter()
        .find(|rule| (rule.pending)(context))
        .map(|rule| rule.agent)
}

pub fn route(context: &Context, message: &str) -> Route {
    match next_pending(context) {
        Some(agent) => Route::Dispatch(agent),
        None if MessageClassifier::requests_rerun(message) => {
            Route::Dispatch(AgentKind::Optimization)
        }
        None => Route::Direct,
    }
}
