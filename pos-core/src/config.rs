//! # Configuração dos Estimadores e do Decodificador
//!
//! Todos os campos têm valores padrão, então um JSON parcial (ou vazio) é válido:
//!
//! ```rust
//! use pos_core::config::HmmConfig;
//!
//! let config = HmmConfig::from_json(r#"{"iteration_cap": 5, "unker": {"kind": "pratyaya"}}"#).unwrap();
//! assert_eq!(config.iteration_cap, 5);
//! assert_eq!(config.unk_threshold, 1);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{PosError, Result};
use crate::unk::UnkerConfig;

/// Estratégia de decodificação.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeStrategy {
    /// Viterbi completo, com treliça e backpointers (caminho ótimo global).
    #[default]
    Viterbi,
    /// Encadeamento guloso: a cada posição mantém apenas a melhor tag anterior.
    /// Pode ser subótimo; existe por compatibilidade com o etiquetador de referência.
    Greedy,
}

/// Parâmetros de treino e decodificação.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HmmConfig {
    /// α da suavização add-α de σ.
    pub smoothing_alpha: f64,
    /// α da suavização add-α de τ.
    pub emission_alpha: f64,
    /// Tokens com contagem `<=` este valor viram categorias UNK.
    pub unk_threshold: u64,
    /// Número fixo de iterações do EM (não há critério de convergência).
    pub iteration_cap: usize,
    /// Amplitude relativa da perturbação aleatória na inicialização do EM.
    pub init_jitter: f64,
    pub unker: UnkerConfig,
    pub decode_strategy: DecodeStrategy,
}

impl Default for HmmConfig {
    fn default() -> Self {
        Self {
            smoothing_alpha: 1.0,
            emission_alpha: 2.0,
            unk_threshold: 1,
            iteration_cap: 1,
            init_jitter: 0.1,
            unker: UnkerConfig::Basic,
            decode_strategy: DecodeStrategy::Viterbi,
        }
    }
}

impl HmmConfig {
    /// Lê a configuração de um JSON e valida.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha.is_finite()) {
            return Err(PosError::InvalidConfig(format!(
                "smoothing_alpha deve ser positivo, recebido {}",
                self.smoothing_alpha
            )));
        }
        if !(self.emission_alpha > 0.0 && self.emission_alpha.is_finite()) {
            return Err(PosError::InvalidConfig(format!(
                "emission_alpha deve ser positivo, recebido {}",
                self.emission_alpha
            )));
        }
        if self.iteration_cap == 0 {
            return Err(PosError::InvalidConfig(
                "iteration_cap deve ser pelo menos 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.init_jitter) {
            return Err(PosError::InvalidConfig(format!(
                "init_jitter deve estar em [0, 1), recebido {}",
                self.init_jitter
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HmmConfig::default();
        assert_eq!(config.smoothing_alpha, 1.0);
        assert_eq!(config.emission_alpha, 2.0);
        assert_eq!(config.unk_threshold, 1);
        assert_eq!(config.iteration_cap, 1);
        assert_eq!(config.decode_strategy, DecodeStrategy::Viterbi);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        assert_eq!(HmmConfig::from_json("{}").unwrap(), HmmConfig::default());
    }

    #[test]
    fn test_partial_json() {
        let config =
            HmmConfig::from_json(r#"{"decode_strategy": "greedy", "smoothing_alpha": 0.5}"#)
                .unwrap();
        assert_eq!(config.decode_strategy, DecodeStrategy::Greedy);
        assert_eq!(config.smoothing_alpha, 0.5);
        assert_eq!(config.emission_alpha, 2.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(HmmConfig::from_json(r#"{"smoothing_alpha": 0.0}"#).is_err());
        assert!(HmmConfig::from_json(r#"{"emission_alpha": -1.0}"#).is_err());
        assert!(HmmConfig::from_json(r#"{"iteration_cap": 0}"#).is_err());
        assert!(HmmConfig::from_json(r#"{"init_jitter": 1.5}"#).is_err());
        assert!(matches!(
            HmmConfig::from_json("not json"),
            Err(PosError::Serialization(_))
        ));
    }
}
