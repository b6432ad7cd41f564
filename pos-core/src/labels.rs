//! # Indexador de Tags
//!
//! As tabelas σ e τ são indexadas por inteiros densos (`0..|Y|`) para acesso rápido
//! em matrizes. O [`LabelIndex`] mantém a bijeção `tag <-> índice` durante toda a vida
//! de um modelo treinado.
//!
//! A tag de fronteira ([`BOUNDARY`]) marca o início e o fim de toda sentença e permite
//! tratar a primeira e a última transição como qualquer outra.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{PosError, Result};

/// Símbolo sentinela usado tanto como tag quanto como token nas pontas das sentenças.
pub const BOUNDARY: &str = "**@sToP@**";

/// Bijeção entre tags (strings) e índices densos.
///
/// A ordem de inserção define os índices: a primeira tag recebe `0`, a segunda `1`, etc.
/// Essa ordem também é o critério de desempate do decodificador (menor índice vence).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct LabelIndex {
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

impl LabelIndex {
    /// Constrói o índice a partir de uma sequência de tags distintas.
    ///
    /// Falha com [`PosError::DuplicateLabel`] se alguma tag se repetir.
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut built = Self {
            labels: Vec::new(),
            index: HashMap::new(),
        };
        for label in labels {
            built.push(label.into())?;
        }
        Ok(built)
    }

    /// Como [`LabelIndex::new`], mas exige a presença da tag de fronteira.
    ///
    /// Usado para conjuntos de tags fornecidos externamente (modo não supervisionado).
    pub fn with_boundary<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let built = Self::new(labels)?;
        if !built.contains(BOUNDARY) {
            return Err(PosError::MissingBoundary(BOUNDARY.to_string()));
        }
        Ok(built)
    }

    /// Tag de fronteira seguida de `n` tags anônimas numeradas (`"1"`, `"2"`, ...).
    ///
    /// Útil quando o modelo não supervisionado deve descobrir as classes sozinho.
    pub fn anonymous(n: usize) -> Self {
        let mut labels = Vec::with_capacity(n + 1);
        labels.push(BOUNDARY.to_string());
        labels.extend((1..=n).map(|i| i.to_string()));
        let index = labels
            .iter()
            .enumerate()
            .map(|(i, y)| (y.clone(), i))
            .collect();
        Self { labels, index }
    }

    /// Reconstrói um índice a partir de outro já existente.
    ///
    /// Os índices de `prior` são preservados e as tags novas de `extra` são anexadas ao
    /// final (tags já conhecidas são ignoradas). É o caminho usado no modo semi-supervisionado
    /// para que o modelo de Baum-Welch enxergue as mesmas posições que o modelo supervisionado.
    pub fn extended<I, S>(prior: &LabelIndex, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut built = prior.clone();
        for label in extra {
            let label = label.into();
            if !built.contains(&label) {
                // a tag não existe, então push não falha
                let _ = built.push(label);
            }
        }
        built
    }

    fn push(&mut self, label: String) -> Result<()> {
        if self.index.contains_key(&label) {
            return Err(PosError::DuplicateLabel(label));
        }
        self.index.insert(label.clone(), self.labels.len());
        self.labels.push(label);
        Ok(())
    }

    /// Índice de uma tag, ou [`PosError::UnknownLabel`].
    pub fn index_of(&self, label: &str) -> Result<usize> {
        self.index
            .get(label)
            .copied()
            .ok_or_else(|| PosError::UnknownLabel(label.to_string()))
    }

    pub fn get(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    /// Tag correspondente a um índice.
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.index.contains_key(label)
    }

    /// Índice da tag de fronteira, se presente.
    pub fn boundary(&self) -> Option<usize> {
        self.get(BOUNDARY)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Tags em ordem de índice.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

impl TryFrom<Vec<String>> for LabelIndex {
    type Error = PosError;

    fn try_from(labels: Vec<String>) -> Result<Self> {
        Self::new(labels)
    }
}

impl From<LabelIndex> for Vec<String> {
    fn from(index: LabelIndex) -> Self {
        index.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_is_bijective() {
        let idx = LabelIndex::new([BOUNDARY, "NN", "VB"]).unwrap();
        assert_eq!(idx.len(), 3);
        for (i, y) in idx.labels().iter().enumerate() {
            assert_eq!(idx.index_of(y).unwrap(), i);
            assert_eq!(idx.label(i), Some(y.as_str()));
        }
        assert_eq!(idx.boundary(), Some(0));
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let err = LabelIndex::new(["NN", "VB", "NN"]).unwrap_err();
        assert!(matches!(err, PosError::DuplicateLabel(ref y) if y == "NN"));
    }

    #[test]
    fn test_unknown_label_error() {
        let idx = LabelIndex::new([BOUNDARY, "NN"]).unwrap();
        assert!(matches!(idx.index_of("JJ"), Err(PosError::UnknownLabel(_))));
    }

    #[test]
    fn test_external_tagset_requires_boundary() {
        assert!(matches!(
            LabelIndex::with_boundary(["NN", "VB"]),
            Err(PosError::MissingBoundary(_))
        ));
        assert!(LabelIndex::with_boundary(["NN", BOUNDARY]).is_ok());
    }

    #[test]
    fn test_extended_preserves_prior_indices() {
        let prior = LabelIndex::new([BOUNDARY, "NN", "VB"]).unwrap();
        let ext = LabelIndex::extended(&prior, ["VB", "JJ"]);
        assert_eq!(ext.index_of("NN").unwrap(), 1);
        assert_eq!(ext.index_of("VB").unwrap(), 2);
        assert_eq!(ext.index_of("JJ").unwrap(), 3);
        assert_eq!(ext.len(), 4);
    }

    #[test]
    fn test_anonymous_tagset() {
        let idx = LabelIndex::anonymous(3);
        assert_eq!(idx.labels(), &[BOUNDARY, "1", "2", "3"]);
    }

    #[test]
    fn test_serde_round_trip_keeps_order() {
        let idx = LabelIndex::new([BOUNDARY, "B", "A"]).unwrap();
        let json = serde_json::to_string(&idx).unwrap();
        assert_eq!(json, format!("[\"{BOUNDARY}\",\"B\",\"A\"]"));
        let back: LabelIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back, idx);
        assert!(serde_json::from_str::<LabelIndex>("[\"A\",\"A\"]").is_err());
    }
}
