//! Priority-based deconfliction policy.
//!
//! Local and advisory: the DSS stays authoritative and may still reject a
//! submission this policy accepted.

use serde::{Deserialize, Serialize};

use crate::geometry::any_intersect;
use crate::models::{OperationalIntentState, Volume4D};

/// An intent already claiming airspace, local or remote.
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingIntent {
    pub id: String,
    pub priority: i32,
    pub state: OperationalIntentState,
    pub volumes: Vec<Volume4D>,
    pub ovn: Option<String>,
    pub uss_base_url: Option<String>,
}

/// How a conflicting intent ranks against the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriorityRelation {
    Higher,
    Equal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictingIntent {
    pub id: String,
    pub priority: i32,
    pub relation: PriorityRelation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deconfliction {
    /// No blocking conflict. `yielding` lists lower-priority intents that
    /// overlap and are expected to give way.
    Clear { yielding: Vec<String> },
    Conflict { conflicting: Vec<ConflictingIntent> },
}

impl Deconfliction {
    pub fn is_clear(&self) -> bool {
        matches!(self, Self::Clear { .. })
    }

    pub fn conflicting_ids(&self) -> Vec<String> {
        match self {
            Self::Clear { .. } => Vec::new(),
            Self::Conflict { conflicting } => conflicting.iter().map(|c| c.id.clone()).collect(),
        }
    }

    pub fn highest_priority_conflict(&self) -> Option<&ConflictingIntent> {
        match self {
            Self::Clear { .. } => None,
            Self::Conflict { conflicting } => conflicting.iter().max_by_key(|c| c.priority),
        }
    }
}

/// Whether moving from `current` to `requested` must be deconflicted.
///
/// Creation always is. Declaring an already known intent off-nominal never
/// is, so emergencies can always be reported.
pub fn requires_check(
    current: Option<OperationalIntentState>,
    requested: OperationalIntentState,
) -> bool {
    match current {
        None => true,
        Some(OperationalIntentState::Ended) => true,
        Some(_) if requested.is_off_nominal() => false,
        Some(_) => true,
    }
}

/// Evaluate a candidate against overlapping intents.
///
/// Ended intents are ignored. Higher or equal priority overlaps block the
/// candidate; ties are not broken.
pub fn evaluate(candidate: &[Volume4D], priority: i32, existing: &[ExistingIntent]) -> Deconfliction {
    let mut conflicting = Vec::new();
    let mut yielding = Vec::new();

    for intent in existing {
        if intent.state == OperationalIntentState::Ended {
            continue;
        }
        if !any_intersect(candidate, &intent.volumes) {
            continue;
        }

        if intent.priority > priority {
            conflicting.push(ConflictingIntent {
                id: intent.id.clone(),
                priority: intent.priority,
                relation: PriorityRelation::Higher,
            });
        } else if intent.priority == priority {
            conflicting.push(ConflictingIntent {
                id: intent.id.clone(),
                priority: intent.priority,
                relation: PriorityRelation::Equal,
            });
        } else {
            yielding.push(intent.id.clone());
        }
    }

    if conflicting.is_empty() {
        Deconfliction::Clear { yielding }
    } else {
        Deconfliction::Conflict { conflicting }
    }
}
