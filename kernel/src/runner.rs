//! Block-wise batch execution with element-wise result accumulation.

use comms::specs::TaskKind;
use ndarray::ArrayD;

use crate::{ComputeKernel, KernelErr, Result};

/// Runs a task against a kernel.
///
/// Batched tasks split the batch dimension into contiguous blocks of
/// `block_size` slots (the whole batch when 0; the last block is the
/// remainder) and sum block outputs element-wise — callers needing
/// averages divide externally. Non-batched tasks invoke the kernel once.
///
/// # Arguments
/// * `kernel` - The compute kernel bound to `task`.
/// * `task` - Which task is running.
/// * `batch_slots` - Size of the batch dimension.
/// * `block_size` - Block length; 0 disables splitting.
///
/// # Returns
/// The accumulated output list; an empty list is a contract violation
/// and reported as `KernelErr::EmptyOutput`.
pub fn run_task(
    kernel: &mut dyn ComputeKernel,
    task: TaskKind,
    batch_slots: usize,
    block_size: usize,
) -> Result<Vec<ArrayD<f32>>> {
    let output = if task.is_batched() {
        let block = if block_size == 0 {
            batch_slots
        } else {
            block_size
        };

        let mut acc: Vec<ArrayD<f32>> = Vec::new();
        let mut end = 0;
        while end < batch_slots {
            let start = end;
            end = (start + block).min(batch_slots);
            let block_output = kernel.run_block(start, end).map_err(KernelErr::from)?;
            if acc.is_empty() {
                acc = block_output;
            } else {
                accumulate(&mut acc, block_output)?;
            }
        }
        acc
    } else {
        kernel.run().map_err(KernelErr::from)?
    };

    if output.is_empty() {
        return Err(KernelErr::EmptyOutput { task });
    }
    Ok(output)
}

/// Number of kernel invocations a batched task performs.
pub fn num_blocks(batch_slots: usize, block_size: usize) -> usize {
    if batch_slots == 0 {
        return 0;
    }
    let block = if block_size == 0 {
        batch_slots
    } else {
        block_size
    };
    batch_slots.div_ceil(block)
}

fn accumulate(acc: &mut [ArrayD<f32>], block: Vec<ArrayD<f32>>) -> Result<()> {
    if block.len() != acc.len() {
        return Err(KernelErr::BlockCountMismatch {
            got: block.len(),
            expected: acc.len(),
        });
    }

    for (index, (sum, part)) in acc.iter_mut().zip(block).enumerate() {
        if sum.shape() != part.shape() {
            return Err(KernelErr::BlockShapeMismatch {
                index,
                got: part.shape().to_vec(),
                expected: sum.shape().to_vec(),
            });
        }
        *sum += &part;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ComputeFault;
    use ndarray::arr0;

    /// Records invocation bounds and yields per-block sums over a value
    /// range, so accumulation is checkable against a closed form.
    struct RangeSumKernel {
        calls: Vec<(usize, usize)>,
    }

    impl RangeSumKernel {
        fn new() -> Self {
            Self { calls: Vec::new() }
        }
    }

    impl ComputeKernel for RangeSumKernel {
        fn run_block(
            &mut self,
            start: usize,
            end: usize,
        ) -> std::result::Result<Vec<ArrayD<f32>>, ComputeFault> {
            self.calls.push((start, end));
            let sum: f32 = (start..end).map(|i| i as f32).sum();
            Ok(vec![arr0(sum).into_dyn()])
        }

        fn run(&mut self) -> std::result::Result<Vec<ArrayD<f32>>, ComputeFault> {
            Ok(vec![arr0(1.0).into_dyn()])
        }
    }

    #[test]
    fn blocks_cover_batch_with_remainder() {
        let mut kernel = RangeSumKernel::new();
        let out = run_task(&mut kernel, TaskKind::Train, 10, 4).unwrap();

        assert_eq!(kernel.calls, vec![(0, 4), (4, 8), (8, 10)]);
        // Sum over 0..10 regardless of the split.
        assert_eq!(out[0][[]], 45.0);
    }

    #[test]
    fn sum_law_holds_for_any_block_size() {
        let reference = {
            let mut kernel = RangeSumKernel::new();
            run_task(&mut kernel, TaskKind::Eval, 10, 0).unwrap()[0][[]]
        };

        for block_size in [1, 3, 4, 5, 7, 10, 16] {
            let mut kernel = RangeSumKernel::new();
            let out = run_task(&mut kernel, TaskKind::Eval, 10, block_size).unwrap();
            assert!(
                (out[0][[]] - reference).abs() < 1e-6,
                "block_size {block_size} diverged"
            );
        }
    }

    #[test]
    fn zero_block_size_runs_whole_batch_once() {
        let mut kernel = RangeSumKernel::new();
        run_task(&mut kernel, TaskKind::GraphEval, 10, 0).unwrap();
        assert_eq!(kernel.calls, vec![(0, 10)]);
    }

    #[test]
    fn non_batched_task_invokes_once_without_bounds() {
        let mut kernel = RangeSumKernel::new();
        let out = run_task(&mut kernel, TaskKind::Forward, 10, 4).unwrap();
        assert!(kernel.calls.is_empty());
        assert_eq!(out[0][[]], 1.0);
    }

    #[test]
    fn empty_output_is_contract_violation() {
        struct EmptyKernel;
        impl ComputeKernel for EmptyKernel {
            fn run_block(
                &mut self,
                _start: usize,
                _end: usize,
            ) -> std::result::Result<Vec<ArrayD<f32>>, ComputeFault> {
                Ok(Vec::new())
            }
            fn run(&mut self) -> std::result::Result<Vec<ArrayD<f32>>, ComputeFault> {
                Ok(Vec::new())
            }
        }

        assert!(matches!(
            run_task(&mut EmptyKernel, TaskKind::Forward, 0, 0),
            Err(KernelErr::EmptyOutput { .. })
        ));
    }

    #[test]
    fn block_count_must_stay_stable() {
        struct FlakyKernel(usize);
        impl ComputeKernel for FlakyKernel {
            fn run_block(
                &mut self,
                _start: usize,
                _end: usize,
            ) -> std::result::Result<Vec<ArrayD<f32>>, ComputeFault> {
                self.0 += 1;
                let n = if self.0 == 1 { 2 } else { 1 };
                Ok(vec![arr0(0.0).into_dyn(); n])
            }
            fn run(&mut self) -> std::result::Result<Vec<ArrayD<f32>>, ComputeFault> {
                Ok(Vec::new())
            }
        }

        assert!(matches!(
            run_task(&mut FlakyKernel(0), TaskKind::Train, 8, 4),
            Err(KernelErr::BlockCountMismatch {
                got: 1,
                expected: 2
            })
        ));
    }

    #[test]
    fn num_blocks_matches_invocations() {
        assert_eq!(num_blocks(10, 4), 3);
        assert_eq!(num_blocks(10, 0), 1);
        assert_eq!(num_blocks(10, 5), 2);
        assert_eq!(num_blocks(0, 4), 0);
    }
}
