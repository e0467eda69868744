//! XGBoost JSON model loading and CPU batch prediction.
//!
//! Only what a regression `gbtree` needs is read from the artifact: the tree
//! arrays, `learner_model_param.base_score`, `num_feature`, and the
//! objective name. Rows are scored on a dedicated rayon pool, in chunks, and
//! written back in input order.
use std::fs;
use std::path::Path;

use ndarray::ArrayView2;
use rayon::prelude::*;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::core::inference::Regressor;
use crate::error::{Error, Result};

/// Rows handed to one rayon task.
const ROWS_PER_TASK: usize = 1024;

/// Objectives whose prediction is the raw margin.
const IDENTITY_OBJECTIVES: &[&str] = &[
    "reg:squarederror",
    "reg:squaredlogerror",
    "reg:pseudohubererror",
    "reg:absoluteerror",
    "reg:quantileerror",
    "reg:linear",
];

/// Errors encountered when loading a model artifact
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed model JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid model: {0}")]
    Invalid(String),
    #[error("Unsupported model: {0}")]
    Unsupported(String),
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl From<ModelError> for Error {
    fn from(e: ModelError) -> Self {
        Error::Config(e.to_string())
    }
}

#[derive(Deserialize)]
struct ModelJson {
    learner: LearnerJson,
}

#[derive(Deserialize)]
struct LearnerJson {
    gradient_booster: BoosterJson,
    learner_model_param: LearnerParamJson,
    objective: ObjectiveJson,
}

#[derive(Deserialize)]
struct BoosterJson {
    name: String,
    // shape depends on `name`, decoded once the booster kind is known
    model: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct GbTreeJson {
    trees: Vec<TreeJson>,
}

#[derive(Deserialize)]
struct TreeJson {
    left_children: Vec<i32>,
    right_children: Vec<i32>,
    split_indices: Vec<u32>,
    split_conditions: Vec<f32>,
    default_left: Vec<Flag>,
    #[serde(default)]
    split_type: Vec<u8>,
}

#[derive(Deserialize)]
struct LearnerParamJson {
    base_score: String,
    num_feature: String,
    #[serde(default)]
    num_class: Option<String>,
    #[serde(default)]
    num_target: Option<String>,
}

#[derive(Deserialize)]
struct ObjectiveJson {
    name: String,
}

/// Older writers store booleans as 0/1.
#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    fn is_set(&self) -> bool {
        match *self {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Node {
    left: i32,
    right: i32,
    feature: u32,
    /// split threshold, or the leaf value when `left < 0`
    value: f32,
    default_left: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn from_json(id: usize, json: TreeJson, num_feature: usize) -> std::result::Result<Self, ModelError> {
        let n = json.left_children.len();
        if n == 0 {
            return Err(ModelError::Invalid(format!("tree {id} has no nodes")));
        }
        if json.right_children.len() != n
            || json.split_indices.len() != n
            || json.split_conditions.len() != n
            || json.default_left.len() != n
        {
            return Err(ModelError::Invalid(format!(
                "tree {id} node arrays differ in length"
            )));
        }
        if json.split_type.iter().any(|&t| t != 0) {
            return Err(ModelError::Unsupported(format!(
                "tree {id} uses categorical splits"
            )));
        }

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            let (left, right) = (json.left_children[i], json.right_children[i]);
            if left >= 0 {
                // children always follow their parent, which also rules out cycles
                let in_range = |c: i32| c as usize > i && (c as usize) < n;
                if right < 0 || !in_range(left) || !in_range(right) {
                    return Err(ModelError::Invalid(format!(
                        "tree {id} node {i} has invalid children ({left}, {right})"
                    )));
                }
                if json.split_indices[i] as usize >= num_feature {
                    return Err(ModelError::Invalid(format!(
                        "tree {id} node {i} splits on feature {} of {num_feature}",
                        json.split_indices[i]
                    )));
                }
            }
            nodes.push(Node {
                left,
                right,
                feature: json.split_indices[i],
                value: json.split_conditions[i],
                default_left: json.default_left[i].is_set(),
            });
        }
        Ok(Tree { nodes })
    }

    #[inline]
    fn leaf_value(&self, row: &[f32], missing: Option<f32>) -> f32 {
        let mut node = &self.nodes[0];
        while node.left >= 0 {
            let x = row[node.feature as usize];
            let go_left = if x.is_nan() || Some(x) == missing {
                node.default_left
            } else {
                x < node.value
            };
            let next = if go_left { node.left } else { node.right };
            node = &self.nodes[next as usize];
        }
        node.value
    }
}

/// A parsed gradient-boosted tree ensemble.
#[derive(Debug, Clone, PartialEq)]
pub struct XgbModel {
    trees: Vec<Tree>,
    base_margin: f32,
    num_feature: usize,
    objective: String,
    missing: Option<f32>,
}

fn parse_param<T: std::str::FromStr>(name: &str, raw: &str) -> std::result::Result<T, ModelError> {
    // vector-valued params are written as "[5E-1]"
    let trimmed = raw.trim().trim_start_matches('[').trim_end_matches(']');
    trimmed
        .parse::<T>()
        .map_err(|_| ModelError::Invalid(format!("cannot parse {name}={raw:?}")))
}

impl XgbModel {
    pub fn from_json_str(json: &str) -> std::result::Result<Self, ModelError> {
        let parsed: ModelJson = serde_json::from_str(json)?;
        let learner = parsed.learner;

        if !IDENTITY_OBJECTIVES.contains(&learner.objective.name.as_str()) {
            return Err(ModelError::Unsupported(format!(
                "objective {} (regression objectives only)",
                learner.objective.name
            )));
        }
        let params = &learner.learner_model_param;
        let num_class: usize = match &params.num_class {
            Some(raw) => parse_param("num_class", raw)?,
            None => 0,
        };
        let num_target: usize = match &params.num_target {
            Some(raw) => parse_param("num_target", raw)?,
            None => 1,
        };
        if num_class > 1 || num_target > 1 {
            return Err(ModelError::Unsupported(
                "multi-output models are not supported".into(),
            ));
        }
        let num_feature: usize = parse_param("num_feature", &params.num_feature)?;
        if num_feature == 0 {
            return Err(ModelError::Invalid("num_feature is 0".into()));
        }
        let base_margin: f32 = parse_param("base_score", &params.base_score)?;

        let booster = learner.gradient_booster;
        if booster.name != "gbtree" {
            return Err(ModelError::Unsupported(format!("booster {}", booster.name)));
        }
        let gbtree: GbTreeJson = booster
            .model
            .map(serde_json::from_value)
            .transpose()?
            .ok_or_else(|| ModelError::Invalid("gbtree booster without model".into()))?;
        let trees = gbtree
            .trees
            .into_iter()
            .enumerate()
            .map(|(id, t)| Tree::from_json(id, t, num_feature))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(XgbModel {
            trees,
            base_margin,
            num_feature,
            objective: learner.objective.name,
            missing: None,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ModelError> {
        let json = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// Treat this exact value, in addition to NaN, as a missing feature.
    pub fn with_missing(mut self, missing: Option<f32>) -> Self {
        self.missing = missing.filter(|m| !m.is_nan());
        self
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn num_feature(&self) -> usize {
        self.num_feature
    }

    pub fn objective(&self) -> &str {
        &self.objective
    }

    /// Raw score of a single feature row.
    pub fn predict_row(&self, row: &[f32]) -> f32 {
        let mut acc = self.base_margin;
        for tree in &self.trees {
            acc += tree.leaf_value(row, self.missing);
        }
        acc
    }
}

/// [`XgbModel`] bound to its own prediction thread pool.
pub struct XgbRegressor {
    model: XgbModel,
    pool: rayon::ThreadPool,
}

impl XgbRegressor {
    /// `threads == 0` sizes the pool to all available cores.
    pub fn new(model: XgbModel, threads: usize) -> std::result::Result<Self, ModelError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("bandcast-predict-{i}"))
            .build()?;
        Ok(Self { model, pool })
    }

    pub fn load<P: AsRef<Path>>(
        path: P,
        threads: usize,
        missing: Option<f32>,
    ) -> std::result::Result<Self, ModelError> {
        let model = XgbModel::load(path.as_ref())?.with_missing(missing);
        let regressor = Self::new(model, threads)?;
        info!(
            "Loaded {} model from {:?}: {} trees, {} features, {} prediction threads",
            regressor.model.objective,
            path.as_ref(),
            regressor.model.num_trees(),
            regressor.model.num_feature,
            regressor.pool.current_num_threads()
        );
        Ok(regressor)
    }

    pub fn model(&self) -> &XgbModel {
        &self.model
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Regressor for XgbRegressor {
    fn num_features(&self) -> usize {
        self.model.num_feature
    }

    fn predict_raw(&self, features: ArrayView2<'_, f32>, out: &mut [f32]) -> Result<()> {
        let (rows, width) = features.dim();
        if width != self.model.num_feature || out.len() != rows {
            return Err(Error::Inference(format!(
                "batch of {rows}x{width} does not fit model with {} features and {} outputs",
                self.model.num_feature,
                out.len()
            )));
        }
        let data = features
            .as_slice()
            .ok_or_else(|| Error::Inference("feature matrix is not contiguous row-major".into()))?;
        let model = &self.model;
        self.pool.install(|| {
            data.par_chunks(width * ROWS_PER_TASK)
                .zip(out.par_chunks_mut(ROWS_PER_TASK))
                .for_each(|(chunk, preds)| {
                    for (row, p) in chunk.chunks_exact(width).zip(preds.iter_mut()) {
                        *p = model.predict_row(row);
                    }
                });
        });
        Ok(())
    }
}
