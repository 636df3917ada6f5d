use anyhow::{Context, Result};
use serenity::model::id::GuildId;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::audio::queue::GuildQueueState;

/// Almacenamiento de colas basado en archivos JSON, uno por guild
pub struct JsonStorage {
    data_dir: PathBuf,
}

impl JsonStorage {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        let queues_dir = data_dir.join("queues");
        fs::create_dir_all(&queues_dir)
            .await
            .with_context(|| format!("No se pudo crear {}", queues_dir.display()))?;

        info!("📁 Storage inicializado en: {}", data_dir.display());

        Ok(Self { data_dir })
    }

    /// Carga la cola de una guild. Un archivo ausente o corrupto es una cola vacía.
    pub async fn load_queue(&self, guild_id: GuildId) -> GuildQueueState {
        let file_path = self.queue_file_path(guild_id);

        let content = match fs::read_to_string(&file_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Sin cola guardada para guild {}", guild_id);
                return GuildQueueState::default();
            }
            Err(e) => {
                warn!("⚠️ No se pudo leer la cola de guild {}: {}", guild_id, e);
                return GuildQueueState::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!("⚠️ Cola corrupta para guild {}, se usa una vacía: {}", guild_id, e);
                GuildQueueState::default()
            }
        }
    }

    /// Carga todas las colas guardadas
    pub async fn load_all_queues(&self) -> HashMap<GuildId, GuildQueueState> {
        let mut queues = HashMap::new();

        let mut files = match fs::read_dir(self.data_dir.join("queues")).await {
            Ok(files) => files,
            Err(e) => {
                warn!("⚠️ No se pudo listar el directorio de colas: {}", e);
                return queues;
            }
        };

        loop {
            let entry = match files.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("⚠️ Error recorriendo el directorio de colas: {}", e);
                    break;
                }
            };

            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }

            let guild_id = path
                .file_stem()
                .and_then(|n| n.to_str())
                .and_then(|name| name.strip_prefix("guild_"))
                .and_then(|id| id.parse::<u64>().ok())
                .filter(|id| *id != 0)
                .map(GuildId::new);

            if let Some(guild_id) = guild_id {
                queues.insert(guild_id, self.load_queue(guild_id).await);
            }
        }

        if !queues.is_empty() {
            info!("📂 Cargadas {} colas de servidor", queues.len());
        }

        queues
    }

    /// Escribe la cola a un archivo temporal y lo renombra encima del anterior
    pub async fn save_queue(&self, guild_id: GuildId, state: &GuildQueueState) -> Result<()> {
        let file_path = self.queue_file_path(guild_id);
        let tmp_path = file_path.with_extension("json.tmp");

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&tmp_path, content)
            .await
            .with_context(|| format!("Error escribiendo {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &file_path)
            .await
            .with_context(|| format!("Error reemplazando {}", file_path.display()))?;

        Ok(())
    }

    fn queue_file_path(&self, guild_id: GuildId) -> PathBuf {
        self.data_dir
            .join("queues")
            .join(format!("guild_{}.json", guild_id))
    }
}

enum WriteCommand {
    Save {
        guild_id: GuildId,
        state: GuildQueueState,
    },
    Flush(oneshot::Sender<()>),
}

/// Cola de escrituras hacia [`JsonStorage`].
///
/// Un único task aplica los snapshots en el orden en que llegaron, sin
/// fusionarlos. Quien envía no espera a que la escritura termine.
#[derive(Clone)]
pub struct QueueWriter {
    tx: mpsc::UnboundedSender<WriteCommand>,
}

impl QueueWriter {
    pub fn spawn(storage: Arc<JsonStorage>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    WriteCommand::Save { guild_id, state } => {
                        if let Err(e) = storage.save_queue(guild_id, &state).await {
                            error!("❌ Error guardando la cola de guild {}: {:?}", guild_id, e);
                        }
                    }
                    WriteCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("Escritor de colas detenido");
        });

        Self { tx }
    }

    pub fn save(&self, guild_id: GuildId, state: GuildQueueState) {
        if self.tx.send(WriteCommand::Save { guild_id, state }).is_err() {
            warn!("⚠️ Escritor de colas cerrado, cambio de guild {} no guardado", guild_id);
        }
    }

    /// Espera a que todas las escrituras anteriores estén en disco
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(WriteCommand::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::{GuildQueue, Track};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn missing_file_is_an_empty_queue() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();

        assert_eq!(storage.load_queue(GuildId::new(5)).await, GuildQueueState::default());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_empty_queue() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();
        let guild = GuildId::new(5);

        fs::write(storage.queue_file_path(guild), "{ esto no es json")
            .await
            .unwrap();

        assert_eq!(storage.load_queue(guild).await, GuildQueueState::default());
        // tampoco rompe la carga completa
        assert_eq!(storage.load_all_queues().await.get(&guild), Some(&GuildQueueState::default()));
    }

    #[tokio::test]
    async fn load_all_skips_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(JsonStorage::new(dir.path().to_path_buf()).await.unwrap());
        let writer = QueueWriter::spawn(storage.clone());
        let queue = GuildQueue::new(writer.clone(), 10);

        queue
            .enqueue(GuildId::new(11), Track::new("A", "https://youtu.be/a", "ana"))
            .unwrap();
        queue
            .enqueue(GuildId::new(12), Track::new("B", "https://youtu.be/b", "beto"))
            .unwrap();
        writer.flush().await;

        fs::write(dir.path().join("queues").join("notes.txt"), "x").await.unwrap();
        fs::write(dir.path().join("queues").join("guild_abc.json"), "{}").await.unwrap();

        let all = storage.load_all_queues().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[&GuildId::new(11)], queue.snapshot(GuildId::new(11)));
        assert_eq!(all[&GuildId::new(12)], queue.snapshot(GuildId::new(12)));
    }

    #[tokio::test]
    async fn writes_land_in_mutation_order() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(JsonStorage::new(dir.path().to_path_buf()).await.unwrap());
        let writer = QueueWriter::spawn(storage.clone());
        let queue = GuildQueue::new(writer.clone(), 100);
        let guild = GuildId::new(3);

        for i in 0..50 {
            queue
                .enqueue(guild, Track::new(format!("t{}", i), format!("https://youtu.be/{}", i), "x"))
                .unwrap();
        }
        queue.move_track(guild, 50, 1).unwrap();
        writer.flush().await;

        let saved = storage.load_queue(guild).await;
        assert_eq!(saved.len(), 50);
        assert_eq!(saved.pending()[0].title(), "t49");
        assert_eq!(saved, queue.snapshot(guild));
    }

    #[tokio::test]
    async fn writer_survives_a_failed_write() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(JsonStorage::new(dir.path().to_path_buf()).await.unwrap());
        let writer = QueueWriter::spawn(storage.clone());
        let queue = GuildQueue::new(writer.clone(), 10);
        let guild = GuildId::new(9);

        fs::remove_dir_all(dir.path().join("queues")).await.unwrap();
        queue
            .enqueue(guild, Track::new("A", "https://youtu.be/a", "ana"))
            .unwrap();
        writer.flush().await;
        assert!(!storage.queue_file_path(guild).exists());

        fs::create_dir_all(dir.path().join("queues")).await.unwrap();
        queue
            .enqueue(guild, Track::new("B", "https://youtu.be/b", "ana"))
            .unwrap();
        writer.flush().await;

        let saved = storage.load_queue(guild).await;
        assert_eq!(saved.len(), 2);
        assert_eq!(saved, queue.snapshot(guild));
    }
}
