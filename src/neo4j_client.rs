use crate::config::AppConfig;
use anyhow::Result;
use neo4rs::{query, Graph};
use tracing::info;
use url::Url;

pub async fn connect_from_config(cfg: &AppConfig) -> Result<Graph> {
    let url = Url::parse(&cfg.neo4j_uri)?;
    let host = url.host_str().unwrap_or("localhost");
    let port = url.port().unwrap_or(7687);
    let addr = format!("{host}:{port}");

    info!("Conectando a Neo4j en {addr}...");
    let graph = Graph::new(&addr, &cfg.neo4j_user, &cfg.neo4j_password).await?;
    info!("Conexión a Neo4j OK");
    Ok(graph)
}

/// Crea constraints e índices de propiedades para :Document y :Chunk.
/// Los índices sobre los campos de faceta aceleran la búsqueda filtrada.
pub async fn ensure_schema(graph: &Graph) -> Result<()> {
    let statements = [
        // Document.id único
        "CREATE CONSTRAINT doc_id IF NOT EXISTS
         FOR (d:Document)
         REQUIRE d.id IS UNIQUE",
        // Chunk.id único
        "CREATE CONSTRAINT chunk_id IF NOT EXISTS
         FOR (c:Chunk)
         REQUIRE c.id IS UNIQUE",
        "CREATE INDEX chunk_doc_type IF NOT EXISTS
         FOR (c:Chunk)
         ON (c.doc_type)",
        "CREATE INDEX chunk_title IF NOT EXISTS
         FOR (c:Chunk)
         ON (c.title)",
    ];

    for stmt in statements {
        graph.run(query(stmt)).await?;
    }

    info!("Esquema de Neo4j asegurado (constraints e índices de facetas).");
    Ok(())
}

/// Garantiza que el índice vectorial sobre `:Chunk(embedding)` exista con la
/// dimensión configurada.
pub async fn ensure_vector_index(graph: &Graph, index_name: &str, dimensions: usize) -> Result<()> {
    // ¿Ya existe el índice? Usamos la sintaxis moderna SHOW VECTOR INDEXES.
    let mut cursor = graph
        .execute(
            query("SHOW VECTOR INDEXES YIELD name WHERE name = $name RETURN name")
                .param("name", index_name),
        )
        .await?;

    if cursor.next().await?.is_some() {
        info!("Índice vectorial '{index_name}' ya existe.");
        return Ok(());
    }

    graph.run(query(&vector_index_statement(index_name, dimensions))).await?;
    info!("Índice vectorial '{index_name}' creado ({dimensions} dimensiones).");

    Ok(())
}

fn vector_index_statement(index_name: &str, dimensions: usize) -> String {
    format!(
        "\
CREATE VECTOR INDEX {index_name} IF NOT EXISTS
FOR (c:Chunk)
ON (c.embedding)
OPTIONS {{
  indexConfig: {{
    `vector.dimensions`: {dimensions},
    `vector.similarity_function`: 'cosine'
  }}
}}"
    )
}
