use serde::Serialize;

/// Classifier output order; index `i` of a score vector belongs to `CLASS_LABELS[i]`.
pub const CLASS_LABELS: [&str; 4] = ["unripe", "ripe", "overripe", "rotten"];

pub const UNKNOWN_ADVICE: &str = "unknown ripeness stage";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RipenessStage {
    Unripe,
    Ripe,
    Overripe,
    Rotten,
}

impl RipenessStage {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "unripe" => Some(RipenessStage::Unripe),
            "ripe" => Some(RipenessStage::Ripe),
            "overripe" => Some(RipenessStage::Overripe),
            "rotten" => Some(RipenessStage::Rotten),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RipenessStage::Unripe => "unripe",
            RipenessStage::Ripe => "ripe",
            RipenessStage::Overripe => "overripe",
            RipenessStage::Rotten => "rotten",
        }
    }

    pub fn base_days(&self) -> f64 {
        match self {
            RipenessStage::Unripe => 5.0,
            RipenessStage::Ripe => 2.0,
            RipenessStage::Overripe => 1.0,
            RipenessStage::Rotten => 0.0,
        }
    }

    pub fn advice(&self) -> &'static str {
        match self {
            RipenessStage::Unripe => "Store at room temperature. Do not refrigerate.",
            RipenessStage::Ripe => "Consume soon or refrigerate to slow ripening.",
            RipenessStage::Overripe => "Use immediately for smoothies or baking.",
            RipenessStage::Rotten => "Discard. Not safe for consumption.",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShelfLife {
    pub days_remaining: f64,
    pub advice: &'static str,
}

/// Scale the stage's base shelf life by the classifier confidence.
///
/// Unknown labels yield zero days and [`UNKNOWN_ADVICE`] instead of an error.
/// `confidence` is not clamped: a percentage passed by mistake produces an
/// out-of-range estimate.
pub fn estimate(label: &str, confidence: f64) -> ShelfLife {
    match RipenessStage::from_label(label) {
        Some(stage) => ShelfLife {
            days_remaining: round2(stage.base_days() * confidence),
            advice: stage.advice(),
        },
        None => ShelfLife {
            days_remaining: 0.0,
            advice: UNKNOWN_ADVICE,
        },
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
