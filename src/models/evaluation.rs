use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorKind {
    Client,
    Contractor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub evaluator_id: Uuid,
    pub evaluated_id: Uuid,
    pub evaluator_kind: EvaluatorKind,
    pub rating: u8,
    pub comment: Option<String>,
    pub punctuality: Option<u8>,
    pub quality: Option<u8>,
    pub communication: Option<u8>,
    pub cleanliness: Option<u8>,
    pub visible: bool,
    pub created_at: DateTime<Utc>,
}

/// Averages over the client evaluations a contractor has received, each
/// rounded to one decimal. Absent sub-scores are left out of their average.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RatingSummary {
    pub overall: f64,
    pub punctuality: f64,
    pub quality: f64,
    pub communication: f64,
    pub cleanliness: f64,
    pub total: usize,
}

impl RatingSummary {
    pub fn from_evaluations<'a>(evaluations: impl IntoIterator<Item = &'a Evaluation>) -> Self {
        let evaluations: Vec<&Evaluation> = evaluations.into_iter().collect();

        Self {
            overall: mean(evaluations.iter().map(|e| Some(e.rating))),
            punctuality: mean(evaluations.iter().map(|e| e.punctuality)),
            quality: mean(evaluations.iter().map(|e| e.quality)),
            communication: mean(evaluations.iter().map(|e| e.communication)),
            cleanliness: mean(evaluations.iter().map(|e| e.cleanliness)),
            total: evaluations.len(),
        }
    }
}

fn mean(scores: impl Iterator<Item = Option<u8>>) -> f64 {
    let (sum, count) = scores
        .flatten()
        .fold((0u32, 0u32), |(sum, count), score| (sum + score as u32, count + 1));

    if count == 0 {
        return 0.0;
    }

    round_one_decimal(sum as f64 / count as f64)
}

pub fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
