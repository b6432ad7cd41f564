//! # Classificador de Tokens Desconhecidos (UNK)
//!
//! Tokens raros ou inéditos não têm contagens confiáveis para estimar τ. Em vez de
//! descartá-los, eles são substituídos por uma **categoria UNK** antes de qualquer contagem.
//!
//! ## Cadeia de Regras
//!
//! Uma cadeia é uma lista **ordenada** de pares `(predicado, categoria)`:
//!
//! ```text
//! token ──► regra 1? ──não──► regra 2? ──não──► ... ──► catchall "*U*"
//!              │sim              │sim
//!              ▼                 ▼
//!          categoria 1       categoria 2
//! ```
//!
//! A **primeira** regra que casa decide. A ordem faz parte do contrato: trocar duas regras
//! cujos predicados se sobrepõem muda a classificação (ex: `-vā` antes de `-ā`).
//!
//! ## Conjuntos de Regras
//! - [`BasicUnker`]: uma única categoria para qualquer token.
//! - [`RuleChain::pratyaya`]: terminações morfológicas do sânscrito (IAST), comparadas
//!   byte a byte, da mais específica para a mais genérica.
//! - [`RuleChain`] personalizado, montado via [`UnkerConfig::Custom`].

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PosError, Result};
use crate::labels::BOUNDARY;
use crate::vocab::Vocabulary;

/// Categoria usada quando nenhuma regra se aplica.
pub const CATCHALL: &str = "*U*";

/// Capacidade de mapear um token para sua categoria UNK.
///
/// A implementação é escolhida na configuração ([`UnkerConfig`]) e usada como objeto
/// dinâmico pelos estimadores e pelo decodificador.
pub trait UnkClassifier: Send + Sync + fmt::Debug {
    /// Categoria do token. Deve ser uma função pura do token.
    ///
    /// Categorias são pontos fixos: `categorize(categorize(t)) == categorize(t)`.
    fn categorize<'a>(&'a self, token: &'a str) -> &'a str;
}

/// Classificador trivial: todo token raro vira `*U*`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicUnker;

impl UnkClassifier for BasicUnker {
    fn categorize<'a>(&'a self, _token: &'a str) -> &'a str {
        CATCHALL
    }
}

/// Predicado compilado de uma regra.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Sempre verdadeiro.
    Always,
    /// O token termina com algum dos sufixos (comparação exata, sensível a maiúsculas).
    EndsWith(Vec<String>),
    /// O token casa com a expressão regular.
    Matches(Regex),
}

impl Predicate {
    pub fn applies_to(&self, token: &str) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::EndsWith(suffixes) => suffixes.iter().any(|s| token.ends_with(s.as_str())),
            Predicate::Matches(re) => re.is_match(token),
        }
    }
}

/// Uma regra: se o predicado vale para o token, o resultado é `category`.
#[derive(Debug, Clone)]
pub struct UnkRule {
    pub predicate: Predicate,
    pub category: String,
}

impl UnkRule {
    pub fn new(predicate: Predicate, category: impl Into<String>) -> Self {
        Self {
            predicate,
            category: category.into(),
        }
    }

    /// Atalho para regras de sufixo.
    pub fn suffix(suffixes: &[&str], category: impl Into<String>) -> Self {
        Self::new(
            Predicate::EndsWith(suffixes.iter().map(|s| s.to_string()).collect()),
            category,
        )
    }
}

/// Cadeia ordenada de regras avaliada por varredura "primeiro que casa".
#[derive(Debug, Clone)]
pub struct RuleChain {
    rules: Vec<UnkRule>,
    catchall: String,
}

/// Terminações do sânscrito em IAST, na ordem de avaliação.
///
/// Cada entrada agrupa grafias equivalentes de uma mesma terminação.
const PRATYAYA_SUFFIXES: &[(&[&str], &str)] = &[
    (&["tavya"], "*Utavya*"),           // gerundivo: kartavya
    (&["nīya", "ṇīya"], "*UnIya*"),     // gerundivo: karaṇīya
    (&["asya"], "*Uasya*"),             // genitivo sing., tema em -a
    (&["ena", "eṇa"], "*Uena*"),        // instrumental sing., tema em -a
    (&["su", "ṣu"], "*Usu*"),           // locativo plural
    (&["aḥ"], "*Uas*"),
    (&["āḥ"], "*UAs*"),
    (&["am", "am\u{0323}"], "*Uam*"),
    (&["ām", "āṃ"], "*UAm*"),
    (&["au"], "*Uau*"),                 // dual
    (&["iḥ"], "*Uis*"),
    (&["oḥ"], "*Uos*"),
    (&["āt"], "*UAt*"),                 // ablativo sing., tema em -a
    (&["at"], "*Uat*"),
    (&["vā", "tyā"], "*UvA*"),          // gerúndio
    (&["ā"], "*UA*"),
    (&["e"], "*Ue*"),
    (&["ḥ"], "*Us*"),                   // tema consonantal
    (&["i"], "*Ui*"),
    (&["ī"], "*UI*"),
];

impl RuleChain {
    pub fn new(rules: Vec<UnkRule>, catchall: impl Into<String>) -> Self {
        Self {
            rules,
            catchall: catchall.into(),
        }
    }

    /// Cadeia morfológica para sânscrito transliterado em IAST.
    pub fn pratyaya() -> Self {
        let rules = PRATYAYA_SUFFIXES
            .iter()
            .map(|(suffixes, category)| UnkRule::suffix(suffixes, *category))
            .collect();
        Self::new(rules, CATCHALL)
    }

    pub fn rules(&self) -> &[UnkRule] {
        &self.rules
    }

    pub fn catchall(&self) -> &str {
        &self.catchall
    }

    /// Verdadeiro se o token já é uma das categorias produzidas por esta cadeia.
    pub fn is_category(&self, token: &str) -> bool {
        token == self.catchall || self.rules.iter().any(|r| r.category == token)
    }
}

impl UnkClassifier for RuleChain {
    fn categorize<'a>(&'a self, token: &'a str) -> &'a str {
        if self.is_category(token) {
            return token;
        }
        self.rules
            .iter()
            .find(|rule| rule.predicate.applies_to(token))
            .map(|rule| rule.category.as_str())
            .unwrap_or(self.catchall.as_str())
    }
}

/// Predicado serializável (forma de configuração de [`Predicate`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateSpec {
    Always,
    EndsWith(Vec<String>),
    Matches(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub when: PredicateSpec,
    pub category: String,
}

fn default_catchall() -> String {
    CATCHALL.to_string()
}

/// Seleção do conjunto de regras UNK em tempo de configuração.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnkerConfig {
    /// Uma única categoria (`*U*`).
    #[default]
    Basic,
    /// Terminações morfológicas do sânscrito.
    Pratyaya,
    /// Cadeia definida pelo usuário, avaliada na ordem dada.
    Custom {
        rules: Vec<RuleSpec>,
        #[serde(default = "default_catchall")]
        catchall: String,
    },
}

impl UnkerConfig {
    /// Compila a configuração em um classificador.
    ///
    /// Falha com [`PosError::InvalidRule`] se alguma expressão regular não compilar.
    pub fn build(&self) -> Result<Box<dyn UnkClassifier>> {
        match self {
            UnkerConfig::Basic => Ok(Box::new(BasicUnker)),
            UnkerConfig::Pratyaya => Ok(Box::new(RuleChain::pratyaya())),
            UnkerConfig::Custom { rules, catchall } => {
                let compiled = rules
                    .iter()
                    .map(|spec| {
                        let predicate = match &spec.when {
                            PredicateSpec::Always => Predicate::Always,
                            PredicateSpec::EndsWith(s) => Predicate::EndsWith(s.clone()),
                            PredicateSpec::Matches(pattern) => {
                                let re = Regex::new(pattern).map_err(|source| {
                                    PosError::InvalidRule {
                                        pattern: pattern.clone(),
                                        source,
                                    }
                                })?;
                                Predicate::Matches(re)
                            }
                        };
                        Ok(UnkRule::new(predicate, spec.category.clone()))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Box::new(RuleChain::new(compiled, catchall.clone())))
            }
        }
    }
}

/// Classificador + limiar de contagem: decide **se** e **como** substituir um token.
///
/// Um token é substituído quando sua contagem no vocabulário é `<= threshold`
/// (tokens inéditos têm contagem zero). O símbolo de fronteira nunca é substituído.
#[derive(Debug)]
pub struct Unker {
    classifier: Box<dyn UnkClassifier>,
    threshold: u64,
}

impl Unker {
    pub fn new(classifier: Box<dyn UnkClassifier>, threshold: u64) -> Self {
        Self {
            classifier,
            threshold,
        }
    }

    pub fn from_config(config: &UnkerConfig, threshold: u64) -> Result<Self> {
        Ok(Self::new(config.build()?, threshold))
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Categoria do token segundo a cadeia, ignorando contagens.
    pub fn classify<'a>(&'a self, token: &'a str) -> &'a str {
        self.classifier.categorize(token)
    }

    pub fn is_rare(&self, token: &str, vocab: &Vocabulary) -> bool {
        token != BOUNDARY && vocab.count(token) <= self.threshold
    }

    /// O token original, ou sua categoria UNK se for raro.
    pub fn substitute<'a>(&'a self, token: &'a str, vocab: &Vocabulary) -> &'a str {
        if self.is_rare(token, vocab) {
            self.classify(token)
        } else {
            token
        }
    }
}
