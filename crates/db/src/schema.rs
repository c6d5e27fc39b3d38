//! Schema bootstrap, run once per pool connect. Grounded on
//! `sage_core/database/connection.py::_initialize_schema`.

use tokio_postgres::Client;

use sage_domain::memory::EMBEDDING_DIM;

/// `CREATE EXTENSION`/`CREATE TABLE IF NOT EXISTS`/index statements. Safe to
/// run against an already-initialized database.
pub async fn initialize(client: &Client) -> Result<(), tokio_postgres::Error> {
    client.batch_execute("CREATE EXTENSION IF NOT EXISTS vector").await?;

    let create_table = format!(
        "CREATE TABLE IF NOT EXISTS memories (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            session_id TEXT,
            user_input TEXT NOT NULL,
            assistant_response TEXT NOT NULL,
            embedding vector({dim}),
            metadata JSONB NOT NULL DEFAULT '{{}}',
            is_agent_report BOOLEAN NOT NULL DEFAULT false,
            agent_metadata JSONB,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        dim = EMBEDDING_DIM
    );
    client.batch_execute(&create_table).await?;

    // pgvector's ivfflat index type caps indexed dimensions at 2000; at
    // 4096 dims we fall back to a sequential scan for the KNN query and
    // rely on these btree/gin indexes for the non-vector filters instead.
    client
        .batch_execute(
            "CREATE INDEX IF NOT EXISTS idx_memories_session_id ON memories (session_id);
             CREATE INDEX IF NOT EXISTS idx_memories_created_at ON memories (created_at DESC);
             CREATE INDEX IF NOT EXISTS idx_memories_is_agent_report ON memories (is_agent_report);
             CREATE INDEX IF NOT EXISTS idx_memories_agent_metadata_gin ON memories USING gin (agent_metadata);
             CREATE INDEX IF NOT EXISTS idx_memories_agent_name
                ON memories ((agent_metadata->>'agent_name'));",
        )
        .await?;

    Ok(())
}
