//! Word-generation kernels.
//!
//! The scalar kernel computes the next generation of one packed word from
//! the nine source words around it: per-bit neighborhood codes are built
//! from a sliding three-bit window over the shifted top/mid/bottom words
//! and looked up in the rule table. The AVX2 kernel runs the same
//! bit-extraction arithmetic on eight rows at once, one 32-bit lane per
//! row; only the table lookups stay scalar (one extracted lane code per
//! bit position).

use super::grid::{Grid, WORD_BITS, Word};
use super::rule::RuleTable;

/// Rows advanced per chunk invocation. Eight u32 lanes fill one 256-bit
/// register.
pub const CHUNK_ROWS: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelBackend {
    Scalar,
    Avx2,
}

/// Next state of every cell in word `(x_word, y)`, read from `grid`.
///
/// The nine source words are fetched exactly once. Interior bit positions
/// reuse the shifted `top`/`mid`/`bot` registers, so the loop is one
/// table lookup per cell with no further memory traffic. The first and
/// last bit positions splice in the single straddling bit from the west
/// and east word columns.
#[inline(always)]
pub fn generate_word(grid: &Grid, table: &RuleTable, x_word: i64, y: i64) -> Word {
    const TOP_BIT: usize = WORD_BITS - 1;

    let mut top = grid.word(x_word, y - 1);
    let mut mid = grid.word(x_word, y);
    let mut bot = grid.word(x_word, y + 1);

    let west_top = grid.word(x_word - 1, y - 1);
    let west_mid = grid.word(x_word - 1, y);
    let west_bot = grid.word(x_word - 1, y + 1);
    let east_top = grid.word(x_word + 1, y - 1);
    let east_mid = grid.word(x_word + 1, y);
    let east_bot = grid.word(x_word + 1, y + 1);

    // Bit 0: the left column of the neighborhood lives in the top bit of
    // the west neighbor words.
    let code = ((west_top >> TOP_BIT) & 1)
        | ((top & 0b11) << 1)
        | (((west_mid >> TOP_BIT) & 1) << 3)
        | ((mid & 0b11) << 4)
        | (((west_bot >> TOP_BIT) & 1) << 6)
        | ((bot & 0b11) << 7);
    let mut out = table.lookup(code as u16) as Word;

    for bit in 1..WORD_BITS - 1 {
        let code = (top & 0b111) | ((mid & 0b111) << 3) | ((bot & 0b111) << 6);
        out |= (table.lookup(code as u16) as Word) << bit;
        top >>= 1;
        mid >>= 1;
        bot >>= 1;
    }

    // Bit WORD_BITS-1: the right column lives in bit 0 of the east
    // neighbor words. top/mid/bot now hold their two highest columns.
    let code = (top & 0b11)
        | ((east_top & 1) << 2)
        | ((mid & 0b11) << 3)
        | ((east_mid & 1) << 5)
        | ((bot & 0b11) << 6)
        | ((east_bot & 1) << 8);
    out |= (table.lookup(code as u16) as Word) << TOP_BIT;

    out
}

/// One word column of source rows for a chunk: rows `y0 - 1 ..= y0 +
/// CHUNK_ROWS`. Interior lanes share rows, so ten fetches per column
/// replace the twenty-four a per-row kernel would issue.
#[inline(always)]
fn fetch_column(grid: &Grid, x_word: i64, y0: i64) -> [Word; CHUNK_ROWS + 2] {
    let mut column = [0; CHUNK_ROWS + 2];
    for (i, word) in column.iter_mut().enumerate() {
        *word = grid.word(x_word, y0 - 1 + i as i64);
    }
    column
}

#[inline(always)]
fn generate_chunk_scalar(
    grid: &Grid,
    table: &RuleTable,
    x_word: i64,
    y0: i64,
) -> [Word; CHUNK_ROWS] {
    let mut out = [0; CHUNK_ROWS];
    for (lane, word) in out.iter_mut().enumerate() {
        *word = generate_word(grid, table, x_word, y0 + lane as i64);
    }
    out
}

// ── AVX2 kernel ─────────────────────────────────────────────────────────

/// Lane vector from eight consecutive column words; lane L holds the word
/// for chunk row L.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
unsafe fn lanes(words: &[Word]) -> std::arch::x86_64::__m256i {
    use std::arch::x86_64::{__m256i, _mm256_loadu_si256};
    debug_assert!(words.len() >= CHUNK_ROWS);
    unsafe { _mm256_loadu_si256(words.as_ptr() as *const __m256i) }
}

/// Look up one bit position for all eight lanes and fold the results into
/// the output words. The table itself is not vectorized; each lane code
/// is extracted and resolved on its own.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
unsafe fn lookup_lanes(
    table: &RuleTable,
    codes_v: std::arch::x86_64::__m256i,
    out: &mut [Word; CHUNK_ROWS],
    bit: usize,
) {
    use std::arch::x86_64::{__m256i, _mm256_storeu_si256};
    let mut codes = [0u32; CHUNK_ROWS];
    unsafe {
        _mm256_storeu_si256(codes.as_mut_ptr() as *mut __m256i, codes_v);
    }
    for (word, &code) in out.iter_mut().zip(codes.iter()) {
        *word |= (table.lookup(code as u16) as Word) << bit;
    }
}

/// AVX2 chunk kernel: eight rows per invocation.
///
/// Every shift and mask of the scalar per-bit loop is applied once across
/// all eight lanes via 32-bit lane arithmetic. Chunk-boundary rows come
/// from the fetched columns (rows `y0 - 1` and `y0 + CHUNK_ROWS` sit just
/// outside the chunk); the six interior rows serve as each other's
/// above/below words through the overlapping lane loads.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
pub unsafe fn generate_chunk_avx2(
    grid: &Grid,
    table: &RuleTable,
    x_word: i64,
    y0: i64,
) -> [Word; CHUNK_ROWS] {
    use std::arch::x86_64::{
        _mm256_and_si256, _mm256_or_si256, _mm256_set1_epi32, _mm256_slli_epi32, _mm256_srli_epi32,
    };

    const TOP_BIT: i32 = WORD_BITS as i32 - 1;

    let center = fetch_column(grid, x_word, y0);
    let west = fetch_column(grid, x_word - 1, y0);
    let east = fetch_column(grid, x_word + 1, y0);

    let mut top = unsafe { lanes(&center[0..]) };
    let mut mid = unsafe { lanes(&center[1..]) };
    let mut bot = unsafe { lanes(&center[2..]) };
    let west_top = unsafe { lanes(&west[0..]) };
    let west_mid = unsafe { lanes(&west[1..]) };
    let west_bot = unsafe { lanes(&west[2..]) };
    let east_top = unsafe { lanes(&east[0..]) };
    let east_mid = unsafe { lanes(&east[1..]) };
    let east_bot = unsafe { lanes(&east[2..]) };

    let mask1 = _mm256_set1_epi32(0b1);
    let mask2 = _mm256_set1_epi32(0b11);
    let mask3 = _mm256_set1_epi32(0b111);

    let mut out = [0; CHUNK_ROWS];

    // Bit 0: splice the top bit of the west column words.
    let codes_v = _mm256_or_si256(
        _mm256_or_si256(
            _mm256_or_si256(
                _mm256_srli_epi32(west_top, TOP_BIT),
                _mm256_slli_epi32(_mm256_and_si256(top, mask2), 1),
            ),
            _mm256_or_si256(
                _mm256_slli_epi32(_mm256_srli_epi32(west_mid, TOP_BIT), 3),
                _mm256_slli_epi32(_mm256_and_si256(mid, mask2), 4),
            ),
        ),
        _mm256_or_si256(
            _mm256_slli_epi32(_mm256_srli_epi32(west_bot, TOP_BIT), 6),
            _mm256_slli_epi32(_mm256_and_si256(bot, mask2), 7),
        ),
    );
    unsafe { lookup_lanes(table, codes_v, &mut out, 0) };

    for bit in 1..WORD_BITS - 1 {
        let codes_v = _mm256_or_si256(
            _mm256_or_si256(
                _mm256_and_si256(top, mask3),
                _mm256_slli_epi32(_mm256_and_si256(mid, mask3), 3),
            ),
            _mm256_slli_epi32(_mm256_and_si256(bot, mask3), 6),
        );
        unsafe { lookup_lanes(table, codes_v, &mut out, bit) };
        top = _mm256_srli_epi32(top, 1);
        mid = _mm256_srli_epi32(mid, 1);
        bot = _mm256_srli_epi32(bot, 1);
    }

    // Bit WORD_BITS-1: splice bit 0 of the east column words.
    let codes_v = _mm256_or_si256(
        _mm256_or_si256(
            _mm256_or_si256(
                _mm256_and_si256(top, mask2),
                _mm256_slli_epi32(_mm256_and_si256(east_top, mask1), 2),
            ),
            _mm256_or_si256(
                _mm256_slli_epi32(_mm256_and_si256(mid, mask2), 3),
                _mm256_slli_epi32(_mm256_and_si256(east_mid, mask1), 5),
            ),
        ),
        _mm256_or_si256(
            _mm256_slli_epi32(_mm256_and_si256(bot, mask2), 6),
            _mm256_slli_epi32(_mm256_and_si256(east_bot, mask1), 8),
        ),
    );
    unsafe { lookup_lanes(table, codes_v, &mut out, WORD_BITS - 1) };

    out
}

/// Advance one chunk of rows with the selected backend.
#[inline(always)]
pub fn generate_chunk(
    grid: &Grid,
    table: &RuleTable,
    x_word: i64,
    y0: i64,
    backend: KernelBackend,
) -> [Word; CHUNK_ROWS] {
    match backend {
        KernelBackend::Scalar => generate_chunk_scalar(grid, table, x_word, y0),
        KernelBackend::Avx2 => {
            #[cfg(target_arch = "x86_64")]
            {
                unsafe { generate_chunk_avx2(grid, table, x_word, y0) }
            }
            #[cfg(not(target_arch = "x86_64"))]
            {
                generate_chunk_scalar(grid, table, x_word, y0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::grid::{Grid, WORD_BITS, Word};
    use super::super::rule::RuleTable;
    use super::{CHUNK_ROWS, generate_chunk_scalar, generate_word};

    use rand::RngCore;
    use rand::SeedableRng;

    fn naive_cell(grid: &Grid, x: i64, y: i64) -> bool {
        let mut neighbors = 0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                neighbors += grid.get_cell(x + dx, y + dy) as u32;
            }
        }
        if grid.get_cell(x, y) {
            neighbors == 2 || neighbors == 3
        } else {
            neighbors == 3
        }
    }

    fn naive_word(grid: &Grid, x_word: i64, y: i64) -> Word {
        let mut out = 0;
        for bit in 0..WORD_BITS {
            let x = x_word * WORD_BITS as i64 + bit as i64;
            out |= (naive_cell(grid, x, y) as Word) << bit;
        }
        out
    }

    fn random_grid(rows: usize, word_columns: usize, rng: &mut rand::rngs::StdRng) -> Grid {
        let mut grid = Grid::new(rows, word_columns);
        for y in 0..rows {
            for x_word in 0..word_columns {
                grid.set_word(rng.next_u32(), x_word as i64, y as i64);
            }
        }
        grid
    }

    #[test]
    fn empty_neighborhood_is_stable() {
        let grid = Grid::new(8, 2);
        let table = RuleTable::new();
        for y in 0..8 {
            for x_word in 0..2 {
                assert_eq!(generate_word(&grid, &table, x_word, y), 0);
            }
        }
    }

    #[test]
    fn matches_naive_per_cell_evaluation() {
        let table = RuleTable::new();
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x0F1E_2D3C_4B5A_6978);
        for _ in 0..64 {
            let grid = random_grid(12, 3, &mut rng);
            for y in 0..12 {
                for x_word in 0..3 {
                    assert_eq!(
                        generate_word(&grid, &table, x_word, y),
                        naive_word(&grid, x_word, y),
                        "word ({x_word},{y})"
                    );
                }
            }
        }
    }

    #[test]
    fn blinker_flips_within_a_word() {
        let mut grid = Grid::new(5, 1);
        let table = RuleTable::new();
        grid.set_cell(4, 2, true);
        grid.set_cell(5, 2, true);
        grid.set_cell(6, 2, true);

        assert_eq!(generate_word(&grid, &table, 0, 1), 1 << 5);
        assert_eq!(generate_word(&grid, &table, 0, 2), 1 << 5);
        assert_eq!(generate_word(&grid, &table, 0, 3), 1 << 5);
        assert_eq!(generate_word(&grid, &table, 0, 0), 0);
        assert_eq!(generate_word(&grid, &table, 0, 4), 0);
    }

    #[test]
    fn straddling_bits_cross_word_boundaries() {
        // Horizontal triple spanning the seam between word 0 and word 1:
        // the birth above/below the center lands in word 1 bit 0.
        let mut grid = Grid::new(5, 2);
        let table = RuleTable::new();
        grid.set_cell(31, 2, true);
        grid.set_cell(32, 2, true);
        grid.set_cell(33, 2, true);

        assert_eq!(generate_word(&grid, &table, 1, 1), 1);
        assert_eq!(generate_word(&grid, &table, 1, 2), 1);
        assert_eq!(generate_word(&grid, &table, 1, 3), 1);
        assert_eq!(generate_word(&grid, &table, 0, 1), 0);
        assert_eq!(generate_word(&grid, &table, 0, 2), 0);
        assert_eq!(generate_word(&grid, &table, 0, 3), 0);
    }

    #[test]
    fn chunk_scalar_matches_per_row_words() {
        let table = RuleTable::new();
        let mut rng = rand::rngs::StdRng::seed_from_u64(0xC0DE_CAFE_0BAD_F00D);
        let grid = random_grid(CHUNK_ROWS * 2, 2, &mut rng);
        for chunk in 0..2 {
            let y0 = (chunk * CHUNK_ROWS) as i64;
            for x_word in 0..2 {
                let words = generate_chunk_scalar(&grid, &table, x_word, y0);
                for (lane, &word) in words.iter().enumerate() {
                    assert_eq!(word, generate_word(&grid, &table, x_word, y0 + lane as i64));
                }
            }
        }
    }

    #[test]
    fn avx2_matches_scalar_randomized() {
        #[cfg(target_arch = "x86_64")]
        {
            use super::generate_chunk_avx2;

            if !std::is_x86_feature_detected!("avx2") {
                return;
            }

            let table = RuleTable::new();
            let mut rng = rand::rngs::StdRng::seed_from_u64(0xA55A_F00D_1122_3344);
            for _ in 0..512 {
                let grid = random_grid(CHUNK_ROWS * 3, 3, &mut rng);
                for chunk in 0..3 {
                    let y0 = (chunk * CHUNK_ROWS) as i64;
                    for x_word in 0..3 {
                        let scalar = generate_chunk_scalar(&grid, &table, x_word, y0);
                        let avx2 = unsafe { generate_chunk_avx2(&grid, &table, x_word, y0) };
                        assert_eq!(scalar, avx2, "chunk ({x_word},{y0})");
                    }
                }
            }
        }
    }
}
