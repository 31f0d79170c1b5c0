//! Code-property graph samples.
//!
//! A [`GraphSample`] is one function's code structure: a node feature
//! matrix, a list of directed typed edges and a binary vulnerability
//! label. Samples are produced by the graph-extraction stage as one JSON
//! file per function and are immutable once loaded.

pub mod batch;

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::Array2;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{Result, VulngraphError};

/// Number of edge categories the extraction stage emits.
pub const EDGE_TYPE_COUNT: usize = 13;

/// Edge categories of the code-property graph.
///
/// The discriminants are a stable contract with the graph-construction
/// stage: edges arrive on disk carrying these codes, and the model
/// allocates one message transform per code. Samples serialize edge types
/// as the bare integer code; an unknown code is a deserialization error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EdgeType {
    Controls = 0,
    Declares = 1,
    Def = 2,
    Dom = 3,
    FlowsTo = 4,
    IsAstParent = 5,
    IsClassOf = 6,
    IsFileOf = 7,
    IsFunctionOfAst = 8,
    IsFunctionOfCfg = 9,
    PostDom = 10,
    Reaches = 11,
    Use = 12,
}

impl EdgeType {
    /// All categories in code order.
    pub const ALL: [EdgeType; EDGE_TYPE_COUNT] = [
        EdgeType::Controls,
        EdgeType::Declares,
        EdgeType::Def,
        EdgeType::Dom,
        EdgeType::FlowsTo,
        EdgeType::IsAstParent,
        EdgeType::IsClassOf,
        EdgeType::IsFileOf,
        EdgeType::IsFunctionOfAst,
        EdgeType::IsFunctionOfCfg,
        EdgeType::PostDom,
        EdgeType::Reaches,
        EdgeType::Use,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<EdgeType> {
        EdgeType::ALL.get(code as usize).copied()
    }

    /// Category name as emitted by the extraction stage.
    pub fn name(self) -> &'static str {
        match self {
            EdgeType::Controls => "CONTROLS",
            EdgeType::Declares => "DECLARES",
            EdgeType::Def => "DEF",
            EdgeType::Dom => "DOM",
            EdgeType::FlowsTo => "FLOWS_TO",
            EdgeType::IsAstParent => "IS_AST_PARENT",
            EdgeType::IsClassOf => "IS_CLASS_OF",
            EdgeType::IsFileOf => "IS_FILE_OF",
            EdgeType::IsFunctionOfAst => "IS_FUNCTION_OF_AST",
            EdgeType::IsFunctionOfCfg => "IS_FUNCTION_OF_CFG",
            EdgeType::PostDom => "POST_DOM",
            EdgeType::Reaches => "REACHES",
            EdgeType::Use => "USE",
        }
    }

    pub fn from_name(name: &str) -> Option<EdgeType> {
        EdgeType::ALL.iter().copied().find(|t| t.name() == name)
    }
}

impl Serialize for EdgeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for EdgeType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        EdgeType::from_code(code)
            .ok_or_else(|| D::Error::custom(format!("unknown edge type code {code}")))
    }
}

/// One function's code-property graph with its vulnerability label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSample {
    /// Node feature matrix `[num_nodes, feature_dim]`.
    pub node_features: Array2<f32>,
    /// Directed typed edges as `(source, target, type)`, node-local indices.
    pub edges: Vec<(usize, usize, EdgeType)>,
    /// 1 = vulnerable, 0 = not.
    pub label: u8,
}

impl GraphSample {
    pub fn num_nodes(&self) -> usize {
        self.node_features.nrows()
    }

    pub fn feature_dim(&self) -> usize {
        self.node_features.ncols()
    }

    /// A graph with zero nodes (or zero edges) is degenerate but valid;
    /// edges referencing nodes outside the feature matrix are not.
    pub fn validate(&self) -> Result<()> {
        let n = self.num_nodes();
        for &(src, tgt, ty) in &self.edges {
            if src >= n || tgt >= n {
                return Err(VulngraphError::InvalidInput(format!(
                    "{} edge ({src}, {tgt}) references a node outside 0..{n}",
                    ty.name()
                )));
            }
        }
        if self.label > 1 {
            return Err(VulngraphError::InvalidInput(format!(
                "label must be 0 or 1, got {}",
                self.label
            )));
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<GraphSample> {
        let file = File::open(path)?;
        let sample: GraphSample = serde_json::from_reader(BufReader::new(file))?;
        sample.validate()?;
        Ok(sample)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn edge_type_codes_are_stable() {
        assert_eq!(EdgeType::Controls.code(), 0);
        assert_eq!(EdgeType::FlowsTo.code(), 4);
        assert_eq!(EdgeType::Reaches.code(), 11);
        assert_eq!(EdgeType::Use.code(), 12);
        for (i, ty) in EdgeType::ALL.iter().enumerate() {
            assert_eq!(ty.code() as usize, i);
            assert_eq!(EdgeType::from_code(ty.code()), Some(*ty));
        }
    }

    #[test]
    fn edge_type_names_round_trip() {
        for ty in EdgeType::ALL {
            assert_eq!(EdgeType::from_name(ty.name()), Some(ty));
        }
        assert_eq!(EdgeType::from_name("NOT_A_REAL_EDGE"), None);
    }

    #[test]
    fn edge_type_serializes_as_code() {
        let json = serde_json::to_string(&EdgeType::FlowsTo).unwrap();
        assert_eq!(json, "4");
        let back: EdgeType = serde_json::from_str("4").unwrap();
        assert_eq!(back, EdgeType::FlowsTo);
    }

    #[test]
    fn unknown_edge_code_is_rejected() {
        assert!(serde_json::from_str::<EdgeType>("13").is_err());
    }

    fn sample() -> GraphSample {
        GraphSample {
            node_features: array![[1.0, 0.0], [0.0, 1.0], [0.5, 0.5]],
            edges: vec![
                (0, 1, EdgeType::Controls),
                (1, 2, EdgeType::FlowsTo),
                (2, 0, EdgeType::Reaches),
            ],
            label: 1,
        }
    }

    #[test]
    fn sample_json_round_trips() {
        let original = sample();
        let json = serde_json::to_string(&original).unwrap();
        let restored: GraphSample = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.node_features, original.node_features);
        assert_eq!(restored.edges, original.edges);
        assert_eq!(restored.label, original.label);
    }

    #[test]
    fn validate_rejects_out_of_range_edges() {
        let mut bad = sample();
        bad.edges.push((0, 9, EdgeType::Def));
        assert!(bad.validate().is_err());
    }

    #[test]
    fn zero_node_graph_is_valid() {
        let empty = GraphSample {
            node_features: Array2::zeros((0, 4)),
            edges: Vec::new(),
            label: 0,
        };
        assert!(empty.validate().is_ok());
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");
        let original = sample();
        original.save(&path).unwrap();
        let restored = GraphSample::load(&path).unwrap();
        assert_eq!(restored.node_features, original.node_features);
        assert_eq!(restored.label, original.label);
    }
}
