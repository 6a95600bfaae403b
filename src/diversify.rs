//! Diversificación: ninguna fuente puede acaparar el presupuesto de resultados.

use std::collections::HashMap;

use crate::models::Hit;

/// Admite como mucho `per_source_cap` pasajes por documento fuente (`source_id`), conservando
/// el orden de entrada (descendente por score), y trunca a `top_k`. Si quedan
/// menos de `top_k` supervivientes se devuelven todos, sin relleno.
pub fn diversify(hits: Vec<Hit>, per_source_cap: usize, top_k: usize) -> Vec<Hit> {
    let mut per_source: HashMap<String, usize> = HashMap::new();
    let mut admitted = Vec::with_capacity(top_k.min(hits.len()));

    for hit in hits {
        if admitted.len() == top_k {
            break;
        }
        let count = per_source.entry(hit.source_id.clone()).or_insert(0);
        if *count < per_source_cap {
            *count += 1;
            admitted.push(hit);
        }
    }

    admitted
}
