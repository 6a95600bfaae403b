//! Traducción de las facetas elegidas por el usuario a un predicado sobre los
//! metadatos del vector store.

use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::models::{fields, FacetCatalog, FacetSelection};

/// Campo de metadatos filtrable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    DocType,
    Title,
}

impl MetadataField {
    /// Nombre canónico de la propiedad en el índice.
    pub fn key(&self) -> &'static str {
        match self {
            Self::DocType => fields::DOC_TYPE,
            Self::Title => fields::TITLE,
        }
    }

    /// Expresión Cypher que lee el campo normalizando las claves heredadas,
    /// igual que `Hit::from_match` al leer resultados.
    pub fn cypher_expr(&self, alias: &str) -> String {
        match self {
            Self::DocType => format!(
                "coalesce({alias}.{}, {alias}.{})",
                fields::DOC_TYPE,
                fields::LEGACY_TYPE
            ),
            Self::Title => format!(
                "coalesce({alias}.{}, {alias}.{})",
                fields::TITLE,
                fields::FILENAME
            ),
        }
    }
}

/// Expresión booleana sobre los metadatos de un `:Chunk`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterPredicate {
    Equals { field: MetadataField, value: String },
    All(Vec<FilterPredicate>),
}

impl FilterPredicate {
    pub fn equals(field: MetadataField, value: impl Into<String>) -> Self {
        Self::Equals { field, value: value.into() }
    }

    /// Renderiza el predicado como cláusula Cypher parametrizada sobre `alias`.
    /// Devuelve la cláusula y los parámetros `(nombre, valor)` en orden.
    pub fn to_cypher(&self, alias: &str) -> (String, Vec<(String, String)>) {
        let mut params = Vec::new();
        let clause = self.render_cypher(alias, &mut params);
        (clause, params)
    }

    fn render_cypher(&self, alias: &str, params: &mut Vec<(String, String)>) -> String {
        match self {
            Self::Equals { field, value } => {
                let name = format!("f{}", params.len());
                params.push((name.clone(), value.clone()));
                format!("{} = ${name}", field.cypher_expr(alias))
            }
            Self::All(terms) => {
                let parts: Vec<String> = terms
                    .iter()
                    .map(|t| t.render_cypher(alias, params))
                    .collect();
                format!("({})", parts.join(" AND "))
            }
        }
    }
}

impl fmt::Display for FilterPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals { field, value } => write!(f, "{} = \"{}\"", field.key(), value),
            Self::All(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" AND ")?;
                    }
                    write!(f, "{term}")?;
                }
                Ok(())
            }
        }
    }
}

/// Construye el predicado para una selección de facetas.
///
/// - Sin tipo: `None` (todo el corpus).
/// - Tipo sin título: igualdad sobre `doc_type`.
/// - Tipo y título conocido en el catálogo: conjunción de ambas igualdades.
/// - Título desconocido para ese tipo: se degrada a sólo tipo.
pub fn build_predicate(
    selection: &FacetSelection,
    catalog: &FacetCatalog,
) -> Option<FilterPredicate> {
    let doc_type = selection.selected_type()?;
    let type_only = FilterPredicate::equals(MetadataField::DocType, doc_type);

    let Some(title) = selection.selected_title() else {
        return Some(type_only);
    };

    if !catalog.contains_title(doc_type, title) {
        warn!(
            doc_type,
            title, "Título no encontrado en el catálogo para ese tipo; se filtra sólo por tipo."
        );
        return Some(type_only);
    }

    Some(FilterPredicate::All(vec![
        type_only,
        FilterPredicate::equals(MetadataField::Title, title),
    ]))
}
