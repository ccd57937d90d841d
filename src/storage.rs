//! Binary I/O for solved results and raw models.
//!
//! Persistence is optional and outside the solve contract; the formats here
//! are flat native-endian dumps behind a small `#[repr(C)]` header with a
//! magic and a version, loaded back through zero-copy memory maps
//! (`memmap2`) with byte-wise copies into owned arrays.
//!
//! Solution file: 16-byte header, `u32[|S|]` policy, `f64[K·|S|]` values.
//! Model file: 40-byte header followed by the slack vector, the CSR
//! transition arrays, the factored reward array, the enabled-action CSR,
//! and the partition blocks with their orderings. Loaded models are
//! re-validated before use.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use memmap2::Mmap;

use crate::types::{LexModel, Policy, ValueTable};

/// Solution file magic: "LVIS".
const SOLUTION_MAGIC: u32 = 0x5349_564C;
const SOLUTION_VERSION: u32 = 1;

/// Model file magic: "LMDM".
const MODEL_MAGIC: u32 = 0x4D44_4D4C;
const MODEL_VERSION: u32 = 1;

#[repr(C)]
struct SolutionFileHeader {
    magic: u32,
    version: u32,
    num_rewards: u32,
    num_states: u32,
}

#[repr(C)]
struct ModelFileHeader {
    magic: u32,
    version: u32,
    num_states: u32,
    num_actions: u32,
    num_rewards: u32,
    num_partitions: u32,
    nnz: u64,
    discount: f64,
}

fn bytes_of<T>(value: &T) -> &[u8] {
    unsafe { std::slice::from_raw_parts(value as *const T as *const u8, std::mem::size_of::<T>()) }
}

fn slice_bytes<T>(values: &[T]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(values.as_ptr() as *const u8, std::mem::size_of_val(values))
    }
}

/// Sequential reader over a mapped file; every read copies, so alignment of
/// the mapped offsets never matters.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> io::Result<&'a [u8]> {
        if self.pos + len > self.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file truncated",
            ));
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn read_u32(&mut self) -> io::Result<u32> {
        let raw = self.take(4)?;
        Ok(u32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn read_u64(&mut self) -> io::Result<u64> {
        let raw = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(raw);
        Ok(u64::from_ne_bytes(buf))
    }

    fn read_u32s(&mut self, count: usize) -> io::Result<Vec<u32>> {
        let raw = self.take(count * 4)?;
        let mut out = vec![0u32; count];
        unsafe {
            std::ptr::copy_nonoverlapping(raw.as_ptr(), out.as_mut_ptr() as *mut u8, raw.len());
        }
        Ok(out)
    }

    fn read_f64s(&mut self, count: usize) -> io::Result<Vec<f64>> {
        let raw = self.take(count * 8)?;
        let mut out = vec![0.0f64; count];
        unsafe {
            std::ptr::copy_nonoverlapping(raw.as_ptr(), out.as_mut_ptr() as *mut u8, raw.len());
        }
        Ok(out)
    }
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Save a solved policy and value table.
pub fn save_solution(values: &ValueTable, policy: &Policy, path: &str) -> io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent)?;
    }
    let mut f = File::create(path)?;
    let header = SolutionFileHeader {
        magic: SOLUTION_MAGIC,
        version: SOLUTION_VERSION,
        num_rewards: values.num_rewards() as u32,
        num_states: values.num_states() as u32,
    };
    f.write_all(bytes_of(&header))?;
    f.write_all(slice_bytes(policy.as_slice()))?;
    f.write_all(slice_bytes(values.as_slice()))?;
    Ok(())
}

/// Load a solution saved by [`save_solution`].
pub fn load_solution(path: &str) -> io::Result<(ValueTable, Policy)> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    let mut cursor = Cursor::new(&mmap);

    let magic = cursor.read_u32()?;
    let version = cursor.read_u32()?;
    if magic != SOLUTION_MAGIC || version != SOLUTION_VERSION {
        return Err(invalid(format!(
            "not a solution file (magic=0x{:08x} version={})",
            magic, version
        )));
    }
    let num_rewards = cursor.read_u32()? as usize;
    let num_states = cursor.read_u32()? as usize;

    let actions = cursor.read_u32s(num_states)?;
    let data = cursor.read_f64s(num_rewards * num_states)?;
    if cursor.pos != mmap.len() {
        return Err(invalid("trailing bytes in solution file"));
    }

    let mut policy = Policy::new(num_states);
    for (s, &a) in actions.iter().enumerate() {
        policy.set(s, a);
    }
    let mut values = ValueTable::zeros(num_rewards, num_states);
    for i in 0..num_rewards {
        values
            .factor_mut(i)
            .copy_from_slice(&data[i * num_states..(i + 1) * num_states]);
    }
    Ok((values, policy))
}

/// Save the raw model: CSR transitions, factored rewards, action masks,
/// slack, and the preference partition.
pub fn save_model(model: &LexModel, path: &str) -> io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent)?;
    }
    let mut f = File::create(path)?;
    let header = ModelFileHeader {
        magic: MODEL_MAGIC,
        version: MODEL_VERSION,
        num_states: model.num_states as u32,
        num_actions: model.num_actions as u32,
        num_rewards: model.num_rewards as u32,
        num_partitions: model.partitions.len() as u32,
        nnz: model.cols.len() as u64,
        discount: model.discount,
    };
    f.write_all(bytes_of(&header))?;
    f.write_all(slice_bytes(&model.slack))?;
    f.write_all(slice_bytes(&model.row_start))?;
    f.write_all(slice_bytes(&model.cols))?;
    f.write_all(slice_bytes(&model.vals))?;
    f.write_all(slice_bytes(&model.reward_vals))?;
    f.write_all(slice_bytes(&model.action_row_start))?;
    f.write_all(slice_bytes(&model.action_ids))?;
    for (states, ordering) in model.partitions.iter().zip(model.orderings.iter()) {
        f.write_all(bytes_of(&(states.len() as u32)))?;
        f.write_all(slice_bytes(states))?;
        f.write_all(slice_bytes(ordering))?;
    }
    Ok(())
}

/// Load and re-validate a model saved by [`save_model`].
pub fn load_model(path: &str) -> io::Result<LexModel> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    let mut cursor = Cursor::new(&mmap);

    let magic = cursor.read_u32()?;
    let version = cursor.read_u32()?;
    if magic != MODEL_MAGIC || version != MODEL_VERSION {
        return Err(invalid(format!(
            "not a model file (magic=0x{:08x} version={})",
            magic, version
        )));
    }
    let num_states = cursor.read_u32()? as usize;
    let num_actions = cursor.read_u32()? as usize;
    let num_rewards = cursor.read_u32()? as usize;
    let num_partitions = cursor.read_u32()? as usize;
    let nnz = cursor.read_u64()? as usize;
    let discount = cursor.read_f64s(1)?[0];

    let slack = cursor.read_f64s(num_rewards)?;
    let row_start = cursor.read_u32s(num_states * num_actions + 1)?;
    let cols = cursor.read_u32s(nnz)?;
    let vals = cursor.read_f64s(nnz)?;
    let reward_vals = cursor.read_f64s(num_rewards * nnz)?;
    let action_row_start = cursor.read_u32s(num_states + 1)?;
    let num_enabled = *action_row_start
        .last()
        .ok_or_else(|| invalid("empty action index"))? as usize;
    let action_ids = cursor.read_u32s(num_enabled)?;

    let mut partitions = Vec::with_capacity(num_partitions);
    let mut orderings = Vec::with_capacity(num_partitions);
    for _ in 0..num_partitions {
        let len = cursor.read_u32()? as usize;
        partitions.push(cursor.read_u32s(len)?);
        orderings.push(cursor.read_u32s(num_rewards)?);
    }
    if cursor.pos != mmap.len() {
        return Err(invalid("trailing bytes in model file"));
    }

    let mut reward_min = vec![f64::INFINITY; num_rewards];
    let mut reward_max = vec![f64::NEG_INFINITY; num_rewards];
    for i in 0..num_rewards {
        for e in 0..nnz {
            let r = reward_vals[i * nnz + e];
            reward_min[i] = reward_min[i].min(r);
            reward_max[i] = reward_max[i].max(r);
        }
    }
    if nnz == 0 {
        reward_min.fill(0.0);
        reward_max.fill(0.0);
    }

    let model = LexModel {
        num_states,
        num_actions,
        num_rewards,
        discount,
        slack,
        row_start,
        cols,
        vals,
        reward_vals,
        reward_min,
        reward_max,
        action_row_start,
        action_ids,
        partitions,
        orderings,
    };
    model
        .validate()
        .map_err(|e| invalid(format!("loaded model failed validation: {e}")))?;
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelBuilder;
    use crate::solver::solve;
    use crate::types::SolverConfig;

    fn sample_model() -> LexModel {
        let mut b = ModelBuilder::new(3, 2, 2, 0.9);
        b.set_slack(&[0.0, 0.25]);
        b.add_transition(0, 0, 1, 0.75, &[1.0, 0.0]);
        b.add_transition(0, 0, 2, 0.25, &[-1.0, 0.5]);
        b.add_transition(0, 1, 0, 1.0, &[0.0, 0.0]);
        for s in 1..3 {
            for a in 0..2 {
                b.add_transition(s, a, s, 1.0, &[0.0, 0.0]);
            }
        }
        b.add_partition(vec![0, 1], vec![0, 1]);
        b.add_partition(vec![2], vec![1, 0]);
        b.finish().unwrap()
    }

    #[test]
    fn test_model_round_trip() {
        let path = std::env::temp_dir().join("lexmdp_test_model.bin");
        let path = path.to_str().unwrap();
        let model = sample_model();
        save_model(&model, path).unwrap();
        let loaded = load_model(path).unwrap();

        assert_eq!(loaded.num_states(), model.num_states());
        assert_eq!(loaded.num_actions(), model.num_actions());
        assert_eq!(loaded.num_rewards(), model.num_rewards());
        assert_eq!(loaded.discount(), model.discount());
        assert_eq!(loaded.slack(), model.slack());
        assert_eq!(loaded.partitions().0, model.partitions().0);
        assert_eq!(loaded.partitions().1, model.partitions().1);
        for s in 0..3 {
            for a in 0..2 {
                assert_eq!(
                    loaded.successors(s, a).collect::<Vec<_>>(),
                    model.successors(s, a).collect::<Vec<_>>()
                );
            }
        }

        // A loaded model solves identically.
        let a = solve(&model, &SolverConfig::default()).unwrap();
        let b = solve(&loaded, &SolverConfig::default()).unwrap();
        assert_eq!(a.policy, b.policy);
        assert_eq!(a.values.as_slice(), b.values.as_slice());

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_solution_round_trip() {
        let path = std::env::temp_dir().join("lexmdp_test_solution.bin");
        let path = path.to_str().unwrap();
        let model = sample_model();
        let solution = solve(&model, &SolverConfig::default()).unwrap();
        save_solution(&solution.values, &solution.policy, path).unwrap();
        let (values, policy) = load_solution(path).unwrap();
        assert_eq!(policy, solution.policy);
        assert_eq!(values.as_slice(), solution.values.as_slice());
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let path = std::env::temp_dir().join("lexmdp_test_garbage.bin");
        fs::write(&path, b"not a model at all, sorry").unwrap();
        let path = path.to_str().unwrap();
        assert!(load_model(path).is_err());
        assert!(load_solution(path).is_err());
        let _ = fs::remove_file(path);
    }
}
