//! Blood cell class labels
//!
//! The classifier distinguishes nine classes. The inference server reports
//! them either by display label or by class index; the index order is the
//! order the model was trained with and differs from the alphabetical order
//! used for display.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Blood cell type predicted by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellType {
    Basophil,
    Eosinophil,
    Erythroblast,
    #[serde(rename = "IGImmatureWhiteCell")]
    IgImmatureWhiteCell,
    Lymphocyte,
    Monocyte,
    Neutrophil,
    Platelet,
    #[serde(rename = "RBC")]
    Rbc,
}

impl CellType {
    /// All classes in display order
    pub const ALL: [CellType; 9] = [
        CellType::Basophil,
        CellType::Eosinophil,
        CellType::Erythroblast,
        CellType::IgImmatureWhiteCell,
        CellType::Lymphocyte,
        CellType::Monocyte,
        CellType::Neutrophil,
        CellType::Platelet,
        CellType::Rbc,
    ];

    /// Class order of the model's output layer
    pub const MODEL_ORDER: [CellType; 9] = [
        CellType::IgImmatureWhiteCell,
        CellType::Basophil,
        CellType::Eosinophil,
        CellType::Erythroblast,
        CellType::Lymphocyte,
        CellType::Monocyte,
        CellType::Neutrophil,
        CellType::Platelet,
        CellType::Rbc,
    ];

    /// Map an output-layer index to its class
    pub fn from_model_index(index: usize) -> Option<CellType> {
        Self::MODEL_ORDER.get(index).copied()
    }

    /// Stable identifier used on the wire and in reports
    pub fn code(&self) -> &'static str {
        match self {
            CellType::Basophil => "Basophil",
            CellType::Eosinophil => "Eosinophil",
            CellType::Erythroblast => "Erythroblast",
            CellType::IgImmatureWhiteCell => "IGImmatureWhiteCell",
            CellType::Lymphocyte => "Lymphocyte",
            CellType::Monocyte => "Monocyte",
            CellType::Neutrophil => "Neutrophil",
            CellType::Platelet => "Platelet",
            CellType::Rbc => "RBC",
        }
    }

    /// Human-readable label
    pub fn display_name(&self) -> &'static str {
        match self {
            CellType::IgImmatureWhiteCell => "IG Immature White Cell",
            CellType::Rbc => "Red Blood Cell",
            other => other.code(),
        }
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for CellType {
    type Err = String;

    /// Accepts codes and display labels, ignoring case, spaces, dashes and
    /// underscores ("IG Immature White Cell", "ig_immature_white_cell").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        let cell = match normalized.as_str() {
            "basophil" => CellType::Basophil,
            "eosinophil" => CellType::Eosinophil,
            "erythroblast" => CellType::Erythroblast,
            "igimmaturewhitecell" | "ig" | "immaturegranulocyte" => CellType::IgImmatureWhiteCell,
            "lymphocyte" => CellType::Lymphocyte,
            "monocyte" => CellType::Monocyte,
            "neutrophil" => CellType::Neutrophil,
            "platelet" => CellType::Platelet,
            "rbc" | "redbloodcell" => CellType::Rbc,
            _ => return Err(format!("Unknown cell type: {}", s)),
        };
        Ok(cell)
    }
}
