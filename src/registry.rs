use crate::metadata::{InfrastructureIdentity, MetadataSource};
use once_cell::sync::OnceCell;
use std::cell::Cell;

thread_local! {
    static BOOTSTRAP_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread belongs to a metadata bootstrap.
///
/// Events emitted there (for instance by the HTTP client) must not be fed
/// back into the registry that is waiting on them.
pub fn on_bootstrap_thread() -> bool {
    BOOTSTRAP_THREAD.with(Cell::get)
}

fn mark_bootstrap_thread() {
    BOOTSTRAP_THREAD.with(|flag| flag.set(true));
}

/// Once-initialized cache of the process [`InfrastructureIdentity`].
///
/// The first call to [`MetadataRegistry::identity`] runs the source's
/// `fetch` to completion; concurrent callers block until it resolves and
/// never observe a partial identity. Later calls are plain reads.
pub struct MetadataRegistry {
    source: Box<dyn MetadataSource>,
    identity: OnceCell<InfrastructureIdentity>,
}

impl MetadataRegistry {
    pub fn new(source: impl MetadataSource + 'static) -> Self {
        MetadataRegistry {
            source: Box::new(source),
            identity: OnceCell::new(),
        }
    }

    /// A registry that is already resolved to `identity` and never fetches.
    pub fn with_identity(identity: InfrastructureIdentity) -> Self {
        MetadataRegistry {
            source: Box::new(StaticSource(identity.clone())),
            identity: OnceCell::with_value(identity),
        }
    }

    pub fn identity(&self) -> &InfrastructureIdentity {
        self.identity.get_or_init(|| bootstrap(self.source.as_ref()))
    }

    pub fn is_initialized(&self) -> bool {
        self.identity.get().is_some()
    }
}

impl std::fmt::Debug for MetadataRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataRegistry")
            .field("identity", &self.identity.get())
            .finish_non_exhaustive()
    }
}

struct StaticSource(InfrastructureIdentity);

#[async_trait::async_trait]
impl MetadataSource for StaticSource {
    async fn fetch(&self) -> InfrastructureIdentity {
        self.0.clone()
    }
}

/// Drive `source.fetch()` on a dedicated thread with its own runtime, so
/// the caller may or may not already be inside a Tokio runtime.
fn bootstrap(source: &dyn MetadataSource) -> InfrastructureIdentity {
    std::thread::scope(|scope| {
        let handle = scope.spawn(|| {
            mark_bootstrap_thread();
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .on_thread_start(mark_bootstrap_thread)
                .build();

            match runtime {
                Ok(runtime) => runtime.block_on(source.fetch()),
                Err(e) => {
                    eprintln!("failed to start metadata bootstrap runtime: {}", e);
                    InfrastructureIdentity::default()
                }
            }
        });

        handle.join().unwrap_or_else(|_| {
            eprintln!("metadata bootstrap panicked, continuing without metadata");
            InfrastructureIdentity::default()
        })
    })
}
