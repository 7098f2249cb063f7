//! WordLife engine: owns the double-buffered grid and the rule table and
//! drives one full-grid generation per step.

use log::{debug, warn};
use rand::RngCore;
use rand::SeedableRng;
use rayon::prelude::*;
use thiserror::Error;

use super::grid::{Grid, GridPair, WORD_BITS, Word};
use super::kernel::{self, CHUNK_ROWS, KernelBackend};
use super::rule::RuleTable;

/// Minimum grid-body size (in words) before `step` dispatches row bands
/// onto the rayon pool; below this the serial loop wins.
const PARALLEL_MIN_WORDS: usize = 1 << 14;

/// Configuration for a WordLife engine instance.
///
/// Use `WordLifeConfig::default()` for a 512x512 world with auto-tuned
/// kernel and pool, or customise individual knobs via the builder
/// methods.
#[derive(Clone, Debug)]
pub struct WordLifeConfig {
    /// Number of cell rows.
    pub rows: usize,
    /// Number of logical cell columns. Must be a multiple of [`WORD_BITS`].
    pub columns: usize,
    /// Kernel backend selection. `None` means auto-detect (AVX2 when the
    /// CPU reports it, scalar otherwise).
    pub kernel: Option<KernelBackend>,
    /// Number of threads for the compute pool.
    /// `None` means auto-detect (physical cores).
    pub thread_count: Option<usize>,
    /// Hard upper bound on threads regardless of auto-detection.
    pub max_threads: Option<usize>,
}

impl Default for WordLifeConfig {
    fn default() -> Self {
        Self {
            rows: 512,
            columns: 512,
            kernel: None,
            thread_count: None,
            max_threads: None,
        }
    }
}

impl WordLifeConfig {
    /// Set the world dimensions in cells.
    pub fn dimensions(mut self, rows: usize, columns: usize) -> Self {
        self.rows = rows;
        self.columns = columns;
        self
    }

    /// Force a specific kernel backend.
    pub fn kernel(mut self, backend: KernelBackend) -> Self {
        self.kernel = Some(backend);
        self
    }

    /// Set an explicit thread count for the compute pool.
    pub fn thread_count(mut self, n: usize) -> Self {
        self.thread_count = Some(n.max(1));
        self
    }

    /// Set a hard upper bound on threads.
    pub fn max_threads(mut self, n: usize) -> Self {
        self.max_threads = Some(n.max(1));
        self
    }
}

/// Construction-time configuration errors. Steady-state stepping has no
/// recoverable errors; everything here is caught before the first tick.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("grid dimensions must be positive (rows={rows}, columns={columns})")]
    ZeroDimension { rows: usize, columns: usize },
    #[error("column count {columns} is not a multiple of the word width {word_bits}")]
    UnalignedColumns { columns: usize, word_bits: usize },
    #[error("failed to build compute pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

#[inline]
fn avx2_available() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        std::is_x86_feature_detected!("avx2")
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        false
    }
}

fn resolve_thread_count(config: &WordLifeConfig) -> usize {
    let mut threads = config
        .thread_count
        .unwrap_or_else(|| num_cpus::get_physical().max(1));
    if let Some(cap) = config.max_threads {
        threads = threads.min(cap);
    }
    threads.max(1)
}

fn resolve_kernel_backend(config: &WordLifeConfig) -> KernelBackend {
    let backend = match config.kernel {
        Some(KernelBackend::Avx2) if !avx2_available() => {
            warn!("AVX2 kernel requested but not supported by this CPU; using scalar");
            KernelBackend::Scalar
        }
        Some(backend) => backend,
        None if avx2_available() => KernelBackend::Avx2,
        None => KernelBackend::Scalar,
    };
    debug!("kernel backend resolved to {backend:?}");
    backend
}

pub struct WordLife {
    grids: GridPair,
    table: RuleTable,
    pool: rayon::ThreadPool,
    backend: KernelBackend,
    rows: usize,
    word_columns: usize,
    generation: u64,
}

impl std::fmt::Debug for WordLife {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordLife")
            .field("backend", &self.backend)
            .field("rows", &self.rows)
            .field("word_columns", &self.word_columns)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl WordLife {
    pub fn new() -> Result<Self, ConfigError> {
        Self::with_config(WordLifeConfig::default())
    }

    /// Create a WordLife engine with explicit configuration.
    pub fn with_config(config: WordLifeConfig) -> Result<Self, ConfigError> {
        if config.rows == 0 || config.columns == 0 {
            return Err(ConfigError::ZeroDimension {
                rows: config.rows,
                columns: config.columns,
            });
        }
        if !config.columns.is_multiple_of(WORD_BITS) {
            return Err(ConfigError::UnalignedColumns {
                columns: config.columns,
                word_bits: WORD_BITS,
            });
        }

        let threads = resolve_thread_count(&config);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
        let backend = resolve_kernel_backend(&config);
        let word_columns = config.columns / WORD_BITS;
        debug!(
            "engine created: {}x{} cells, {} word columns, {} threads",
            config.rows, config.columns, word_columns, threads
        );

        Ok(Self {
            grids: GridPair::new(config.rows, word_columns),
            table: RuleTable::new(),
            pool,
            backend,
            rows: config.rows,
            word_columns,
            generation: 0,
        })
    }

    /// Advance one generation: every word of the write-side buffer is
    /// computed from the read side, then the buffer roles flip.
    pub fn step(&mut self) {
        let (current, next) = self.grids.current_and_next_mut();
        let word_columns = self.word_columns;
        let backend = self.backend;
        let table = &self.table;
        let body = next.body_mut();

        let band_words = word_columns * CHUNK_ROWS;
        if body.len() >= PARALLEL_MIN_WORDS && self.pool.current_num_threads() > 1 {
            self.pool.install(|| {
                body.par_chunks_mut(band_words)
                    .enumerate()
                    .for_each(|(band_index, band)| {
                        generate_band(current, table, backend, word_columns, band_index, band);
                    });
            });
        } else {
            for (band_index, band) in body.chunks_mut(band_words).enumerate() {
                generate_band(current, table, backend, word_columns, band_index, band);
            }
        }

        self.grids.swap();
        self.generation += 1;
    }

    /// Advance `n` generations.
    pub fn step_n(&mut self, n: u64) {
        for _ in 0..n {
            self.step();
        }
    }

    #[inline]
    pub fn get_cell(&self, x: i64, y: i64) -> bool {
        self.grids.current().get_cell(x, y)
    }

    /// Set one cell in the current buffer. Out-of-range coordinates are a
    /// silent no-op, mirroring the clamp the kernels use.
    #[inline]
    pub fn set_cell(&mut self, x: i64, y: i64, alive: bool) {
        self.grids.current_mut().set_cell(x, y, alive);
    }

    /// Bulk read of one packed word, for renderers that unpack a row at a
    /// time instead of calling `get_cell` per glyph.
    #[inline]
    pub fn get_word(&self, x_word: i64, y: i64) -> Word {
        self.grids.current().word(x_word, y)
    }

    pub fn population(&self) -> u64 {
        self.grids.current().population()
    }

    /// Kill every cell in both buffers.
    pub fn clear(&mut self) {
        self.grids.fill_dead();
    }

    /// Seed a uniformly random world: each cell is set live with
    /// probability `density`. Deterministic for a given seed.
    pub fn randomize(&mut self, density: f64, seed: u64) {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let threshold = (u64::MAX as f64 * density) as u64;
        let grid = self.grids.current_mut();
        for y in 0..self.rows {
            for x in 0..self.word_columns * WORD_BITS {
                if rng.next_u64() <= threshold {
                    grid.set_cell(x as i64, y as i64, true);
                }
            }
        }
    }

    /// Visit every live cell in the current buffer.
    pub fn for_each_live<F: FnMut(i64, i64)>(&self, mut f: F) {
        let grid = self.grids.current();
        for y in 0..self.rows {
            for x_word in 0..self.word_columns {
                let mut word = grid.word(x_word as i64, y as i64);
                while word != 0 {
                    let bit = word.trailing_zeros() as usize;
                    f((x_word * WORD_BITS + bit) as i64, y as i64);
                    word &= word - 1;
                }
            }
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn word_columns(&self) -> usize {
        self.word_columns
    }

    #[inline]
    pub fn columns(&self) -> usize {
        self.word_columns * WORD_BITS
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn backend(&self) -> KernelBackend {
        self.backend
    }
}

/// Generate one band of rows into the write-side body slice. Full bands
/// go through the chunk kernel; the remainder band below the last full
/// chunk takes the scalar path row by row.
fn generate_band(
    current: &Grid,
    table: &RuleTable,
    backend: KernelBackend,
    word_columns: usize,
    band_index: usize,
    band: &mut [Word],
) {
    let y0 = (band_index * CHUNK_ROWS) as i64;
    let band_rows = band.len() / word_columns;

    if band_rows == CHUNK_ROWS {
        for x_word in 0..word_columns {
            let words = kernel::generate_chunk(current, table, x_word as i64, y0, backend);
            for (lane, &word) in words.iter().enumerate() {
                band[lane * word_columns + x_word] = word;
            }
        }
    } else {
        for row in 0..band_rows {
            let y = y0 + row as i64;
            let out = &mut band[row * word_columns..(row + 1) * word_columns];
            for (x_word, slot) in out.iter_mut().enumerate() {
                *slot = kernel::generate_word(current, table, x_word as i64, y);
            }
        }
    }
}
