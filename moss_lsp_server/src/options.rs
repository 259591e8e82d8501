/// Which ad-hoc analysis features the server advertises. All on by default;
/// the embedder can carve out individual providers.
#[derive(Clone, Debug)]
pub struct Features {
    pub definition: bool,
    pub document_symbol: bool,
    pub workspace_symbol: bool,
    pub hover: bool,
    pub references: bool,
    pub signature_help: bool,
    pub completion: bool,
}

impl Default for Features {
    fn default() -> Features {
        Features {
            definition: true,
            document_symbol: true,
            workspace_symbol: true,
            hover: true,
            references: true,
            signature_help: true,
            completion: true,
        }
    }
}

/// Server configuration handed in by the embedder. Loading these from the
/// command line is the embedder's business.
#[derive(Clone, Debug)]
pub struct LspOptions {
    /// Ignore patterns anchored at the workspace root (leading `/`).
    pub absolute_ignore_patterns: Vec<String>,
    /// Ignore patterns matching any path component.
    pub relative_ignore_patterns: Vec<String>,
    /// Route every typecheck through the slow path and skip hash
    /// bookkeeping.
    pub disable_fast_path: bool,
    /// Worker threads available to the typecheck engine.
    pub typecheck_threads: usize,
    /// Snapshot per-thread counters into the queue during pre-processing.
    pub collect_thread_counters: bool,
    pub features: Features,
}

impl Default for LspOptions {
    fn default() -> LspOptions {
        LspOptions {
            absolute_ignore_patterns: Vec::new(),
            relative_ignore_patterns: Vec::new(),
            disable_fast_path: false,
            typecheck_threads: 4,
            collect_thread_counters: false,
            features: Features::default(),
        }
    }
}
