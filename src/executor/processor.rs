// src/executor/processor.rs

//! The processor boundary and a reference simulator behind it.
//!
//! The execution engine never touches qubits or the network itself; every
//! quantum operation, entanglement request, classical message and wait is
//! dispatched through the [`Processor`] trait. [`SimProcessor`] is the
//! built-in implementation: a seeded state-vector simulator with loopback
//! classical sockets, enough to run single-node programs deterministically.

use std::collections::{HashMap, VecDeque};

use num_complex::Complex;
use num_traits::{One, Zero};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

use crate::flavour::RotAxis;
use crate::isa::angle::Angle;
use crate::isa::instr::{BreakpointAction, BreakpointRole, Opcode};
use crate::validation::{
    controlled_rotation_unitary, rotation_unitary, single_gate_unitary, two_qubit_unitary, C64,
    Mat2, Mat4,
};

/// Number of result-array slots one generated pair occupies.
pub const ENT_INFO_LENGTH: usize = 10;

/// A failure reported by a processor.
///
/// `Aborted` means the operation was cancelled before taking effect (for
/// example by the peer closing an entanglement socket); everything else is
/// `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorError {
    Failed { message: String },
    Aborted { message: String },
}

impl ProcessorError {
    pub fn failed(message: impl Into<String>) -> ProcessorError {
        ProcessorError::Failed { message: message.into() }
    }

    pub fn aborted(message: impl Into<String>) -> ProcessorError {
        ProcessorError::Aborted { message: message.into() }
    }
}

/// The device and network operations an execution engine dispatches to.
///
/// Virtual qubit ids are program-chosen `i32`s; the processor owns the
/// mapping to physical resources. Calls are the engine's only suspension
/// points: a processor may block inside any of them.
pub trait Processor {
    /// Allocates a qubit under the given virtual id.
    fn qalloc(&mut self, virt_id: i32) -> Result<(), ProcessorError>;

    /// Resets an allocated qubit to |0>.
    fn init(&mut self, virt_id: i32) -> Result<(), ProcessorError>;

    /// Frees an allocated qubit.
    fn qfree(&mut self, virt_id: i32) -> Result<(), ProcessorError>;

    /// Applies a fixed single-qubit gate.
    fn single_gate(&mut self, opcode: Opcode, virt_id: i32) -> Result<(), ProcessorError>;

    /// Applies a rotation about `axis`.
    fn rotation(&mut self, axis: RotAxis, virt_id: i32, angle: Angle)
        -> Result<(), ProcessorError>;

    /// Applies a fixed two-qubit gate, control first.
    fn two_qubit_gate(
        &mut self,
        opcode: Opcode,
        control: i32,
        target: i32,
    ) -> Result<(), ProcessorError>;

    /// Applies a conditional rotation about `axis`, control first: the
    /// target rotates by `+angle` when the control is |0> and by `-angle`
    /// when it is |1>.
    fn controlled_rotation(
        &mut self,
        axis: RotAxis,
        control: i32,
        target: i32,
        angle: Angle,
    ) -> Result<(), ProcessorError>;

    /// Moves the state of `source` onto the freshly initialized `target`.
    fn mov(&mut self, source: i32, target: i32) -> Result<(), ProcessorError>;

    /// Measures in the computational basis, collapsing the state. Returns
    /// the outcome, 0 or 1.
    fn measure(&mut self, virt_id: i32) -> Result<i32, ProcessorError>;

    /// Initiates entanglement generation with a peer. Binds one pair per
    /// entry of `qubit_ids` and returns [`ENT_INFO_LENGTH`] result words
    /// per pair.
    fn create_epr(
        &mut self,
        remote_node: i32,
        epr_socket: i32,
        qubit_ids: &[i32],
        args: &[i32],
    ) -> Result<Vec<i32>, ProcessorError>;

    /// Accepts entanglement generation initiated by a peer; returns result
    /// words as for [`Processor::create_epr`].
    fn recv_epr(
        &mut self,
        remote_node: i32,
        epr_socket: i32,
        qubit_ids: &[i32],
    ) -> Result<Vec<i32>, ProcessorError>;

    /// Sends a classical message on a socket.
    fn send_msg(&mut self, socket: i32, payload: &[i32]) -> Result<(), ProcessorError>;

    /// Receives a classical message from a socket, blocking until one is
    /// available.
    fn recv_msg(&mut self, socket: i32) -> Result<Vec<i32>, ProcessorError>;

    /// Called when a wait instruction finds unfilled array slots; gives the
    /// processor a chance to deliver pending results before the engine
    /// checks again.
    fn wait_for(&mut self) -> Result<(), ProcessorError> {
        Ok(())
    }

    /// Records a breakpoint snapshot.
    fn breakpoint(
        &mut self,
        action: BreakpointAction,
        role: BreakpointRole,
    ) -> Result<(), ProcessorError> {
        let _ = (action, role);
        Ok(())
    }
}

/// A simulated qubit slot: its index within the joint state vector.
#[derive(Debug, Clone, Copy)]
struct SimQubit {
    position: usize,
}

/// A deterministic state-vector simulator implementing [`Processor`].
///
/// The joint state of all allocated qubits is a dense vector of
/// `2^n` amplitudes; qubit `position` owns bit `n - 1 - position` of every
/// basis index. Measurement outcomes are drawn from a seeded generator, so
/// a given seed replays identically.
#[derive(Debug)]
pub struct SimProcessor {
    qubits: HashMap<i32, SimQubit>,
    state: Vec<C64>,
    rng: StdRng,
    /// Loopback classical sockets: a send on a socket id is received by the
    /// next `recv_msg` on the same id.
    messages: HashMap<i32, VecDeque<Vec<i32>>>,
    snapshots: Vec<(BreakpointAction, BreakpointRole)>,
    epr_sequence: i32,
}

impl SimProcessor {
    pub fn new(seed: u64) -> SimProcessor {
        SimProcessor {
            qubits: HashMap::new(),
            state: vec![C64::one()],
            rng: StdRng::seed_from_u64(seed),
            messages: HashMap::new(),
            snapshots: Vec::new(),
            epr_sequence: 0,
        }
    }

    /// Number of currently allocated qubits.
    pub fn qubit_count(&self) -> usize {
        self.qubits.len()
    }

    /// Breakpoint snapshots recorded so far, in program order.
    pub fn snapshots(&self) -> &[(BreakpointAction, BreakpointRole)] {
        &self.snapshots
    }

    fn lookup(&self, virt_id: i32) -> Result<SimQubit, ProcessorError> {
        self.qubits.get(&virt_id).copied().ok_or_else(|| {
            ProcessorError::failed(format!("qubit {virt_id} is not allocated"))
        })
    }

    fn bit_of(&self, qubit: SimQubit) -> usize {
        self.qubits.len() - 1 - qubit.position
    }

    /// Applies a 2x2 unitary to one qubit of the joint state.
    fn apply_mat2(&mut self, qubit: SimQubit, gate: &Mat2) {
        let bit = self.bit_of(qubit);
        let mask = 1usize << bit;
        for base in 0..self.state.len() {
            if base & mask != 0 {
                continue;
            }
            let other = base | mask;
            let a0 = self.state[base];
            let a1 = self.state[other];
            self.state[base] = gate.0[0][0] * a0 + gate.0[0][1] * a1;
            self.state[other] = gate.0[1][0] * a0 + gate.0[1][1] * a1;
        }
    }

    /// Applies a 4x4 unitary to a qubit pair, `high` indexing the
    /// higher-order bit of the gate's basis.
    fn apply_mat4(&mut self, high: SimQubit, low: SimQubit, gate: &Mat4) {
        let high_mask = 1usize << self.bit_of(high);
        let low_mask = 1usize << self.bit_of(low);
        for base in 0..self.state.len() {
            if base & high_mask != 0 || base & low_mask != 0 {
                continue;
            }
            let idx = [
                base,
                base | low_mask,
                base | high_mask,
                base | high_mask | low_mask,
            ];
            let amps = idx.map(|i| self.state[i]);
            for (row, &i) in idx.iter().enumerate() {
                let mut acc = C64::zero();
                for (col, &amp) in amps.iter().enumerate() {
                    acc += gate.0[row][col] * amp;
                }
                self.state[i] = acc;
            }
        }
    }

    fn check_pair(&self, control: i32, target: i32) -> Result<(SimQubit, SimQubit), ProcessorError> {
        if control == target {
            return Err(ProcessorError::failed(format!(
                "two-qubit operation needs distinct qubits, got {control} twice",
            )));
        }
        Ok((self.lookup(control)?, self.lookup(target)?))
    }

    /// Fabricates the per-pair result words of an entanglement generation.
    fn ent_info(&mut self, remote_node: i32, qubit_id: i32) -> Vec<i32> {
        self.epr_sequence += 1;
        let mut info = vec![0; ENT_INFO_LENGTH];
        info[1] = self.epr_sequence;
        info[2] = qubit_id;
        info[4] = self.epr_sequence;
        info[6] = remote_node;
        info
    }
}

impl Processor for SimProcessor {
    fn qalloc(&mut self, virt_id: i32) -> Result<(), ProcessorError> {
        if self.qubits.contains_key(&virt_id) {
            return Err(ProcessorError::failed(format!(
                "qubit {virt_id} is already allocated",
            )));
        }
        let position = self.qubits.len();
        self.qubits.insert(virt_id, SimQubit { position });
        // The new qubit owns basis bit 0 and starts in |0>, so existing
        // amplitudes move to the even indices.
        let mut grown = vec![C64::zero(); self.state.len() * 2];
        for (index, amp) in self.state.iter().enumerate() {
            grown[index << 1] = *amp;
        }
        self.state = grown;
        Ok(())
    }

    fn init(&mut self, virt_id: i32) -> Result<(), ProcessorError> {
        let qubit = self.lookup(virt_id)?;
        // Project onto |0> by measuring and flipping a |1> outcome.
        let outcome = self.collapse(qubit)?;
        if outcome == 1 {
            self.apply_mat2(
                qubit,
                &single_gate_unitary(Opcode::X).ok_or_else(|| {
                    ProcessorError::failed("missing X unitary")
                })?,
            );
        }
        Ok(())
    }

    fn qfree(&mut self, virt_id: i32) -> Result<(), ProcessorError> {
        let qubit = self.lookup(virt_id)?;
        // Collapse first so discarding the qubit cannot entangle dangling
        // amplitudes with the remaining state.
        let outcome = self.collapse(qubit)?;
        let bit = self.bit_of(qubit);
        let mask = 1usize << bit;
        let keep = if outcome == 1 { mask } else { 0 };
        let mut shrunk = Vec::with_capacity(self.state.len() / 2);
        for (index, amp) in self.state.iter().enumerate() {
            if index & mask == keep {
                shrunk.push(*amp);
            }
        }
        self.state = shrunk;
        self.qubits.remove(&virt_id);
        for other in self.qubits.values_mut() {
            if other.position > qubit.position {
                other.position -= 1;
            }
        }
        Ok(())
    }

    fn single_gate(&mut self, opcode: Opcode, virt_id: i32) -> Result<(), ProcessorError> {
        let qubit = self.lookup(virt_id)?;
        let gate = single_gate_unitary(opcode).ok_or_else(|| {
            ProcessorError::failed(format!("`{opcode}` is not a single-qubit gate"))
        })?;
        self.apply_mat2(qubit, &gate);
        Ok(())
    }

    fn rotation(
        &mut self,
        axis: RotAxis,
        virt_id: i32,
        angle: Angle,
    ) -> Result<(), ProcessorError> {
        let qubit = self.lookup(virt_id)?;
        self.apply_mat2(qubit, &rotation_unitary(axis, angle));
        Ok(())
    }

    fn two_qubit_gate(
        &mut self,
        opcode: Opcode,
        control: i32,
        target: i32,
    ) -> Result<(), ProcessorError> {
        let (control, target) = self.check_pair(control, target)?;
        let gate = two_qubit_unitary(opcode).ok_or_else(|| {
            ProcessorError::failed(format!("`{opcode}` is not a two-qubit gate"))
        })?;
        self.apply_mat4(control, target, &gate);
        Ok(())
    }

    fn controlled_rotation(
        &mut self,
        axis: RotAxis,
        control: i32,
        target: i32,
        angle: Angle,
    ) -> Result<(), ProcessorError> {
        let (control, target) = self.check_pair(control, target)?;
        self.apply_mat4(control, target, &controlled_rotation_unitary(axis, angle));
        Ok(())
    }

    fn mov(&mut self, source: i32, target: i32) -> Result<(), ProcessorError> {
        // The target is required to be freshly initialized, so a swap
        // realizes the move and leaves the source in |0>.
        let (source, target) = self.check_pair(source, target)?;
        let mut swap = Mat4::identity();
        swap.0[1][1] = C64::zero();
        swap.0[2][2] = C64::zero();
        swap.0[1][2] = C64::one();
        swap.0[2][1] = C64::one();
        self.apply_mat4(source, target, &swap);
        Ok(())
    }

    fn measure(&mut self, virt_id: i32) -> Result<i32, ProcessorError> {
        let qubit = self.lookup(virt_id)?;
        self.collapse(qubit)
    }

    fn create_epr(
        &mut self,
        remote_node: i32,
        epr_socket: i32,
        qubit_ids: &[i32],
        _args: &[i32],
    ) -> Result<Vec<i32>, ProcessorError> {
        let _ = epr_socket;
        let mut results = Vec::with_capacity(qubit_ids.len() * ENT_INFO_LENGTH);
        for &qubit_id in qubit_ids {
            // Local stand-in for a delivered pair: one fresh qubit in |0>
            // plus its result words.
            self.qalloc(qubit_id)?;
            results.extend(self.ent_info(remote_node, qubit_id));
        }
        Ok(results)
    }

    fn recv_epr(
        &mut self,
        remote_node: i32,
        epr_socket: i32,
        qubit_ids: &[i32],
    ) -> Result<Vec<i32>, ProcessorError> {
        self.create_epr(remote_node, epr_socket, qubit_ids, &[])
    }

    fn send_msg(&mut self, socket: i32, payload: &[i32]) -> Result<(), ProcessorError> {
        self.messages.entry(socket).or_default().push_back(payload.to_vec());
        Ok(())
    }

    fn recv_msg(&mut self, socket: i32) -> Result<Vec<i32>, ProcessorError> {
        self.messages
            .get_mut(&socket)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| {
                ProcessorError::failed(format!("no message pending on socket {socket}"))
            })
    }

    fn breakpoint(
        &mut self,
        action: BreakpointAction,
        role: BreakpointRole,
    ) -> Result<(), ProcessorError> {
        self.snapshots.push((action, role));
        Ok(())
    }
}

impl SimProcessor {
    /// Measures one qubit, collapsing and renormalizing the joint state.
    fn collapse(&mut self, qubit: SimQubit) -> Result<i32, ProcessorError> {
        let mask = 1usize << self.bit_of(qubit);
        let p_one: f64 = self
            .state
            .iter()
            .enumerate()
            .filter(|(index, _)| index & mask != 0)
            .map(|(_, amp)| amp.norm_sqr())
            .sum();
        let outcome = if self.rng.random::<f64>() < p_one { 1 } else { 0 };
        let keep = if outcome == 1 { mask } else { 0 };
        let norm = if outcome == 1 { p_one } else { 1.0 - p_one };
        if norm <= f64::EPSILON {
            return Err(ProcessorError::failed(
                "measurement collapsed onto a zero-probability branch",
            ));
        }
        let scale = Complex::new(1.0 / norm.sqrt(), 0.0);
        for (index, amp) in self.state.iter_mut().enumerate() {
            if index & mask == keep {
                *amp *= scale;
            } else {
                *amp = C64::zero();
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_qubit_measures_zero() -> Result<(), ProcessorError> {
        let mut sim = SimProcessor::new(1);
        sim.qalloc(0)?;
        sim.init(0)?;
        assert_eq!(sim.measure(0)?, 0);
        Ok(())
    }

    #[test]
    fn x_flips_the_outcome() -> Result<(), ProcessorError> {
        let mut sim = SimProcessor::new(1);
        sim.qalloc(0)?;
        sim.init(0)?;
        sim.single_gate(Opcode::X, 0)?;
        assert_eq!(sim.measure(0)?, 1);
        Ok(())
    }

    #[test]
    fn hadamard_outcomes_replay_under_the_same_seed() -> Result<(), ProcessorError> {
        let run = |seed| -> Result<Vec<i32>, ProcessorError> {
            let mut sim = SimProcessor::new(seed);
            let mut outcomes = Vec::new();
            for _ in 0..20 {
                sim.qalloc(0)?;
                sim.init(0)?;
                sim.single_gate(Opcode::H, 0)?;
                outcomes.push(sim.measure(0)?);
                sim.qfree(0)?;
            }
            Ok(outcomes)
        };
        assert_eq!(run(42)?, run(42)?);
        Ok(())
    }

    #[test]
    fn cnot_correlates_a_bell_pair() -> Result<(), ProcessorError> {
        for seed in 0..10 {
            let mut sim = SimProcessor::new(seed);
            sim.qalloc(0)?;
            sim.qalloc(1)?;
            sim.init(0)?;
            sim.init(1)?;
            sim.single_gate(Opcode::H, 0)?;
            sim.two_qubit_gate(Opcode::Cnot, 0, 1)?;
            assert_eq!(sim.measure(0)?, sim.measure(1)?);
        }
        Ok(())
    }

    #[test]
    fn mov_transfers_the_state() -> Result<(), ProcessorError> {
        let mut sim = SimProcessor::new(3);
        sim.qalloc(0)?;
        sim.qalloc(1)?;
        sim.init(0)?;
        sim.init(1)?;
        sim.single_gate(Opcode::X, 0)?;
        sim.mov(0, 1)?;
        assert_eq!(sim.measure(1)?, 1);
        assert_eq!(sim.measure(0)?, 0);
        Ok(())
    }

    #[test]
    fn qfree_rejects_reuse() {
        let mut sim = SimProcessor::new(0);
        sim.qalloc(0).unwrap();
        sim.qfree(0).unwrap();
        assert!(sim.measure(0).is_err());
    }

    #[test]
    fn loopback_messages_arrive_in_order() -> Result<(), ProcessorError> {
        let mut sim = SimProcessor::new(0);
        sim.send_msg(4, &[1, 2])?;
        sim.send_msg(4, &[3])?;
        assert_eq!(sim.recv_msg(4)?, vec![1, 2]);
        assert_eq!(sim.recv_msg(4)?, vec![3]);
        assert!(sim.recv_msg(4).is_err());
        Ok(())
    }

    #[test]
    fn create_epr_returns_one_record_per_pair() -> Result<(), ProcessorError> {
        let mut sim = SimProcessor::new(0);
        let results = sim.create_epr(2, 0, &[0, 1], &[])?;
        assert_eq!(results.len(), 2 * ENT_INFO_LENGTH);
        assert_eq!(results[2], 0);
        assert_eq!(results[ENT_INFO_LENGTH + 2], 1);
        assert_eq!(sim.qubit_count(), 2);
        Ok(())
    }
}
