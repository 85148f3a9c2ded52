//! Model serialization and deserialization.
//!
//! Uses bincode for fast, compact binary serialization.
//! Format: magic bytes (MXLM) + version (u32, little endian) + bincode payload.
//! Optional JSON sidecar for human inspection.

use std::path::{Path, PathBuf};

use tracing::info;

use super::fitted::FittedModel;
use crate::error::{MixlmError, Result};

/// Magic bytes: "MXLM" (MiXed Linear Model).
pub const MAGIC: [u8; 4] = *b"MXLM";
/// Current model file version.
pub const VERSION: u32 = 1;

/// Path of the binary model file for an output prefix.
pub fn model_path(prefix: &str) -> PathBuf {
    PathBuf::from(format!("{}.mixlm.model", prefix))
}

/// Path of the JSON sidecar for a model file.
pub fn sidecar_path(model_path: &Path) -> PathBuf {
    let mut s = model_path.as_os_str().to_owned();
    s.push(".json");
    PathBuf::from(s)
}

/// Encode a fitted model with its header.
pub fn to_bytes(model: &FittedModel) -> Result<Vec<u8>> {
    let payload =
        bincode::serialize(model).map_err(|e| MixlmError::Serialization(e.to_string()))?;
    let mut out = Vec::with_capacity(payload.len() + 8);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode a fitted model, checking magic bytes and version first.
pub fn from_bytes(data: &[u8]) -> Result<FittedModel> {
    if data.len() < 8 || data[..4] != MAGIC {
        return Err(MixlmError::Serialization(format!(
            "invalid model file: expected magic bytes {:?}",
            std::str::from_utf8(&MAGIC).unwrap_or("MXLM")
        )));
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&data[4..8]);
    let version = u32::from_le_bytes(version);
    if version != VERSION {
        return Err(MixlmError::Serialization(format!(
            "unsupported model file version {} (this build reads version {})",
            version, VERSION
        )));
    }
    let model: FittedModel =
        bincode::deserialize(&data[8..]).map_err(|e| MixlmError::Serialization(e.to_string()))?;
    check_layout(&model)?;
    Ok(model)
}

/// Vector lengths must agree with the design before anything indexes by block.
fn check_layout(model: &FittedModel) -> Result<()> {
    let bad = |what: String| Err(MixlmError::Serialization(format!("inconsistent model: {}", what)));
    let design = &model.design;

    let p = design.fixed_names().len();
    if model.beta.len() != p || model.vcov_beta.len() != p * p {
        return bad(format!(
            "{} fixed-effect columns but {} estimates and {} covariance entries",
            p,
            model.beta.len(),
            model.vcov_beta.len()
        ));
    }

    if model.variance_components.len() != design.random.len() {
        return bad(format!(
            "{} random terms but {} variance components",
            design.random.len(),
            model.variance_components.len()
        ));
    }
    let q: usize = design.random.iter().map(|b| b.n_columns()).sum();
    for (block, vc) in design.random.iter().zip(&model.variance_components) {
        let k = block.dim();
        if vc.dim() != k || vc.covariance.len() != k * k {
            return bad(format!("variance component for '{}' does not match its term", block.group));
        }
        if block.offset + block.n_columns() > q {
            return bad(format!("term '{}' extends past the random-effects vector", block.group));
        }
    }
    if model.random_effects.len() != q || model.random_effect_variances.len() != q {
        return bad(format!(
            "{} random-effect columns but {} random effects and {} conditional variances",
            q,
            model.random_effects.len(),
            model.random_effect_variances.len()
        ));
    }
    Ok(())
}

/// Save a fitted model to a binary file (.mixlm.model).
pub fn save_model(model: &FittedModel, path: &Path) -> Result<()> {
    std::fs::write(path, to_bytes(model)?)?;
    info!("Saved model to {}", path.display());
    Ok(())
}

/// Load a fitted model from a binary file (.mixlm.model).
pub fn load_model(path: &Path) -> Result<FittedModel> {
    let data = std::fs::read(path)?;
    from_bytes(&data)
}

/// Save a JSON sidecar for inspection (.mixlm.model.json).
pub fn save_model_json(model: &FittedModel, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(model)
        .map_err(|e| MixlmError::Serialization(e.to_string()))?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::ModelSpec;
    use crate::lmm::ModelFitter;
    use mixlm_data::simulate::{simulate_survey, SimulationConfig};
    use mixlm_data::survey::observations_to_dataset;

    fn small_model() -> FittedModel {
        let obs = simulate_survey(&SimulationConfig {
            n_respondents: 200,
            ..Default::default()
        })
        .unwrap();
        let data = observations_to_dataset(&obs).unwrap();
        let spec = ModelSpec::parse("therm_dem ~ scale(age) + (1 | state)").unwrap();
        ModelFitter::default().fit(&data, &spec).unwrap()
    }

    #[test]
    fn test_save_load_roundtrip() {
        let model = small_model();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.mixlm.model");

        save_model(&model, &path).unwrap();
        let loaded = load_model(&path).unwrap();

        assert_eq!(loaded.spec, model.spec);
        assert_eq!(loaded.beta, model.beta);
        assert_eq!(loaded.theta, model.theta);
        assert_eq!(loaded.design, model.design);
        assert!((loaded.log_likelihood - model.log_likelihood).abs() < 1e-12);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = to_bytes(&small_model()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(from_bytes(&bytes), Err(MixlmError::Serialization(_))));
        assert!(from_bytes(b"MX").is_err());
    }

    #[test]
    fn test_version_checked() {
        let mut bytes = to_bytes(&small_model()).unwrap();
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
        let err = from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("version 99"));
    }

    #[test]
    fn test_truncated_random_effects_rejected() {
        let mut model = small_model();
        model.random_effects.pop();
        let err = from_bytes(&to_bytes(&model).unwrap()).unwrap_err();
        assert!(matches!(err, MixlmError::Serialization(_)));
        assert!(err.to_string().contains("random effects"), "{}", err);

        let mut model = small_model();
        model.variance_components.clear();
        assert!(from_bytes(&to_bytes(&model).unwrap()).is_err());
    }

    #[test]
    fn test_json_sidecar() {
        let model = small_model();
        let dir = tempfile::tempdir().unwrap();
        let path = model_path(dir.path().join("m").to_str().unwrap());
        let json_path = sidecar_path(&path);
        assert!(json_path.to_string_lossy().ends_with(".mixlm.model.json"));
        save_model_json(&model, &json_path).unwrap();
        let text = std::fs::read_to_string(&json_path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["criterion"], "Reml");
    }
}
