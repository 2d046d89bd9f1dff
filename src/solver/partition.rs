//! Splitting the right-hand sides into outer blocks.
//!
//! Adaptive mode sizes each block `min(remaining, block_size)`. Otherwise
//! every block has exactly `block_size` slots and the unfilled tail carries
//! the placeholder index `-1`.

/// Iterator over the original column indices of each outer block.
#[derive(Debug, Clone)]
pub struct BlockPartition {
    num_rhs: usize,
    block_size: usize,
    adaptive: bool,
    start: usize,
}

impl BlockPartition {
    pub fn new(num_rhs: usize, block_size: usize, adaptive: bool) -> Self {
        Self { num_rhs, block_size: block_size.max(1), adaptive, start: 0 }
    }
}

impl Iterator for BlockPartition {
    type Item = Vec<isize>;

    fn next(&mut self) -> Option<Vec<isize>> {
        if self.start >= self.num_rhs {
            return None;
        }
        let real = (self.num_rhs - self.start).min(self.block_size);
        let width = if self.adaptive { real } else { self.block_size };
        let block = (0..width)
            .map(|i| if i < real { (self.start + i) as isize } else { -1 })
            .collect();
        self.start += real;
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adaptive_blocks_shrink_to_the_remainder() {
        let blocks: Vec<_> = BlockPartition::new(5, 2, true).collect();
        assert_eq!(blocks, vec![vec![0, 1], vec![2, 3], vec![4]]);
    }

    #[test]
    fn fixed_blocks_are_padded_with_placeholders() {
        let blocks: Vec<_> = BlockPartition::new(3, 4, false).collect();
        assert_eq!(blocks, vec![vec![0, 1, 2, -1]]);
        let blocks: Vec<_> = BlockPartition::new(5, 2, false).collect();
        assert_eq!(blocks, vec![vec![0, 1], vec![2, 3], vec![4, -1]]);
    }

    #[test]
    fn every_column_is_covered_exactly_once() {
        for num_rhs in 0..9 {
            for block_size in 1..6 {
                for adaptive in [true, false] {
                    let seen: Vec<isize> =
                        BlockPartition::new(num_rhs, block_size, adaptive).flatten().filter(|&i| i >= 0).collect();
                    assert_eq!(seen, (0..num_rhs as isize).collect::<Vec<_>>());
                }
            }
        }
    }

    #[test]
    fn no_blocks_without_right_hand_sides() {
        assert_eq!(BlockPartition::new(0, 3, true).count(), 0);
    }
}
