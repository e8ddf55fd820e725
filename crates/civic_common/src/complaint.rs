//! Complaint taxonomy for 311 service requests.
//!
//! The six categories here are the only ones the assistant files cases
//! for. Prompt builders and the dashboard color map both derive from
//! this enum so the wording can never drift between them.

/// A recognized 311 complaint category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComplaintType {
    Pothole,
    Graffiti,
    StreetlightOut,
    SidewalkRepair,
    MissedGarbageCollection,
    NoiseComplaint,
}

/// Marker color for rows whose complaint type is not recognized.
pub const UNKNOWN_TYPE_COLOR: &str = "#808080";

impl ComplaintType {
    /// Every category, in the order prompts and dashboards present them.
    pub const ALL: [ComplaintType; 6] = [
        ComplaintType::Pothole,
        ComplaintType::Graffiti,
        ComplaintType::StreetlightOut,
        ComplaintType::SidewalkRepair,
        ComplaintType::MissedGarbageCollection,
        ComplaintType::NoiseComplaint,
    ];

    /// Canonical display form, as stored on cases and shown to residents.
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintType::Pothole => "Pothole",
            ComplaintType::Graffiti => "Graffiti",
            ComplaintType::StreetlightOut => "Streetlight Out",
            ComplaintType::SidewalkRepair => "Sidewalk Repair",
            ComplaintType::MissedGarbageCollection => "Missed Garbage Collection",
            ComplaintType::NoiseComplaint => "Noise Complaint",
        }
    }

    /// Map-marker color for this category.
    pub fn color(&self) -> &'static str {
        match self {
            ComplaintType::Pothole => "#FF8C00",
            ComplaintType::Graffiti => "#DC143C",
            ComplaintType::StreetlightOut => "#FFD700",
            ComplaintType::SidewalkRepair => "#4169E1",
            ComplaintType::MissedGarbageCollection => "#32CD32",
            ComplaintType::NoiseComplaint => "#9370DB",
        }
    }

    /// Parse a canonical label back into a category.
    pub fn from_label(label: &str) -> Option<ComplaintType> {
        ComplaintType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == label)
    }
}

/// Marker color for an arbitrary complaint label, gray when unrecognized.
///
/// Case rows come back from the desk with free-text labels, so this has
/// to be total.
pub fn color_for(label: &str) -> &'static str {
    ComplaintType::from_label(label)
        .map(|t| t.color())
        .unwrap_or(UNKNOWN_TYPE_COLOR)
}

/// Comma-separated category list for prompt text.
pub fn type_list() -> String {
    ComplaintType::ALL
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
