//! Circuit execution on the simulator or through a hardware backend.
//!
//! Both paths take fully bound circuits and return per-wire ⟨Z⟩. The
//! parameter-shift helpers build every shifted copy of a batch up front
//! and send it in one [`CircuitExecutor::execute`] call, so a hardware
//! backend sees a handful of large jobs instead of one job per shift.

use async_trait::async_trait;
use ndarray::{Array1, Array2};
use qnode_adapter_sim::Statevector;
use qnode_hal::{Backend, HalError, ValidationResult};
use qnode_ir::{Circuit, ParametricCircuit, ShiftRule};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::error::{NodeError, NodeResult};
use crate::measure::MeasureAll;

/// Something that turns bound circuits into per-wire expectations.
#[async_trait]
pub trait CircuitExecutor: Send + Sync {
    /// Executor name for logs.
    fn name(&self) -> &str;

    /// Whether results are shot estimates rather than exact values.
    fn is_hardware(&self) -> bool {
        false
    }

    /// ⟨Z⟩ on every wire of every circuit, in input order.
    async fn execute(&self, circuits: &[Circuit]) -> NodeResult<Vec<Array1<f64>>>;
}

/// Exact statevector execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatorExecutor {
    measure: MeasureAll,
}

impl SimulatorExecutor {
    /// Create a simulator executor measuring Pauli-Z on every wire.
    pub fn new() -> Self {
        Self {
            measure: MeasureAll::pauli_z(),
        }
    }

    /// Run one circuit synchronously.
    pub fn run(&self, circuit: &Circuit) -> Array1<f64> {
        self.measure.from_statevector(&Statevector::from_circuit(circuit))
    }
}

#[async_trait]
impl CircuitExecutor for SimulatorExecutor {
    fn name(&self) -> &str {
        "statevector"
    }

    async fn execute(&self, circuits: &[Circuit]) -> NodeResult<Vec<Array1<f64>>> {
        Ok(circuits.iter().map(|c| self.run(c)).collect())
    }
}

/// Execution through a [`Backend`], chunked into batch jobs.
pub struct HardwareProcessor {
    backend: Arc<dyn Backend>,
    shots: u32,
    max_circuits_per_job: usize,
    measure: MeasureAll,
}

impl HardwareProcessor {
    /// Wrap a backend; jobs are as large as the backend allows.
    pub fn new(backend: Arc<dyn Backend>, shots: u32) -> Self {
        let max_circuits_per_job = backend.capabilities().max_circuits_per_job.max(1);
        Self {
            backend,
            shots,
            max_circuits_per_job,
            measure: MeasureAll::pauli_z(),
        }
    }

    /// Cap the number of circuits per job, never above the backend limit.
    pub fn with_max_circuits_per_job(mut self, n: usize) -> Self {
        let limit = self.backend.capabilities().max_circuits_per_job.max(1);
        self.max_circuits_per_job = n.clamp(1, limit);
        self
    }

    /// Shots per circuit.
    pub fn shots(&self) -> u32 {
        self.shots
    }

    /// Circuits per submitted job.
    pub fn max_circuits_per_job(&self) -> usize {
        self.max_circuits_per_job
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }
}

#[async_trait]
impl CircuitExecutor for HardwareProcessor {
    fn name(&self) -> &str {
        self.backend.name()
    }

    fn is_hardware(&self) -> bool {
        true
    }

    #[instrument(skip_all, fields(backend = self.backend.name(), circuits = circuits.len()))]
    async fn execute(&self, circuits: &[Circuit]) -> NodeResult<Vec<Array1<f64>>> {
        if circuits.is_empty() {
            return Ok(Vec::new());
        }

        let availability = self.backend.availability().await?;
        if !availability.is_available {
            return Err(HalError::BackendUnavailable(
                availability
                    .status_message
                    .unwrap_or_else(|| self.backend.name().to_string()),
            )
            .into());
        }

        for circuit in circuits {
            if let ValidationResult::Invalid { reasons } = self.backend.validate(circuit).await? {
                return Err(HalError::InvalidCircuit(reasons.join("; ")).into());
            }
        }

        let n_jobs = circuits.len().div_ceil(self.max_circuits_per_job);
        info!(
            "Submitting {} circuits in {} job(s), {} shots each",
            circuits.len(),
            n_jobs,
            self.shots
        );

        let mut rows = Vec::with_capacity(circuits.len());
        for (k, chunk) in circuits.chunks(self.max_circuits_per_job).enumerate() {
            let job_id = self.backend.submit(chunk, self.shots).await?;
            debug!("Job {}/{}: {}", k + 1, n_jobs, job_id);
            let result = self.backend.wait(&job_id).await?;
            if result.counts.len() != chunk.len() {
                return Err(HalError::JobFailed(format!(
                    "job {job_id} returned {} histograms for {} circuits",
                    result.counts.len(),
                    chunk.len()
                ))
                .into());
            }
            rows.extend(
                chunk
                    .iter()
                    .zip(&result.counts)
                    .map(|(c, counts)| self.measure.from_counts(counts, c.num_qubits())),
            );
        }
        Ok(rows)
    }
}

/// Which angles [`process_parameterized_and_shift`] differentiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftTarget {
    /// Trainable weights; the unshifted batch is evaluated too.
    Weights,
    /// Input columns.
    Inputs,
}

/// Result of a shifted batch.
#[derive(Debug, Clone)]
pub struct ShiftOutput {
    /// Unshifted `(batch × wires)` output, for [`ShiftTarget::Weights`].
    pub circuit_out: Option<Array2<f64>>,
    /// `∂out/∂θ` as a `(batch × wires)` array per weight or input column.
    pub jacobian: Vec<Array2<f64>>,
}

/// One shifted copy of the batch.
struct Variant {
    target: usize,
    shift: f64,
    coeff: f64,
}

pub(crate) fn check_batch(circuit: &ParametricCircuit, weights: &[f64], x: &Array2<f64>) -> NodeResult<()> {
    if x.nrows() == 0 {
        return Err(NodeError::ShapeMismatch("empty batch".into()));
    }
    if x.ncols() < circuit.num_inputs() {
        return Err(NodeError::ShapeMismatch(format!(
            "circuit '{}' reads {} input columns, batch has {}",
            circuit.name(),
            circuit.num_inputs(),
            x.ncols()
        )));
    }
    if weights.len() != circuit.num_trainable() {
        return Err(NodeError::ShapeMismatch(format!(
            "circuit '{}' has {} trainable angles, got {} weights",
            circuit.name(),
            circuit.num_trainable(),
            weights.len()
        )));
    }
    Ok(())
}

pub(crate) fn bind_rows(
    circuit: &ParametricCircuit,
    weights: &[f64],
    x: &Array2<f64>,
    out: &mut Vec<Circuit>,
) -> NodeResult<()> {
    for row in x.rows() {
        let inputs = row.to_vec();
        out.push(circuit.bind(&inputs, weights)?);
    }
    Ok(())
}

/// Run `circuit` on every row of `x`; returns `(batch × wires)`.
#[instrument(skip_all, fields(executor = executor.name(), batch = x.nrows()))]
pub async fn process_parameterized(
    executor: &dyn CircuitExecutor,
    circuit: &ParametricCircuit,
    weights: &[f64],
    x: &Array2<f64>,
) -> NodeResult<Array2<f64>> {
    check_batch(circuit, weights, x)?;
    let mut bound = Vec::with_capacity(x.nrows());
    bind_rows(circuit, weights, x, &mut bound)?;
    let rows = executor.execute(&bound).await?;
    MeasureAll::stack(&rows, circuit.num_qubits() as usize)
}

/// Evaluate every parameter-shift term for `target` in one execution.
///
/// Circuits are laid out batch-by-batch as `[unshifted, terms of weight 0,
/// terms of weight 1, ...]` for weights, or `[terms of column 0, ...]` for
/// inputs. Input columns the circuit never reads get a zero Jacobian without
/// being evaluated.
#[instrument(skip_all, fields(executor = executor.name(), batch = x.nrows(), shift_target = ?target))]
pub async fn process_parameterized_and_shift(
    executor: &dyn CircuitExecutor,
    circuit: &ParametricCircuit,
    weights: &[f64],
    x: &Array2<f64>,
    target: ShiftTarget,
) -> NodeResult<ShiftOutput> {
    check_batch(circuit, weights, x)?;
    let (batch, n_wires) = (x.nrows(), circuit.num_qubits() as usize);

    let (n_targets, rules): (usize, Vec<Option<ShiftRule>>) = match target {
        ShiftTarget::Weights => (
            weights.len(),
            circuit.trainable_shift_rules().into_iter().map(Some).collect(),
        ),
        ShiftTarget::Inputs => {
            let used = circuit.input_indices();
            let rules = (0..x.ncols())
                .map(|i| {
                    used.binary_search(&i)
                        .ok()
                        .map(|_| circuit.input_shift_rule(i))
                })
                .collect();
            (x.ncols(), rules)
        }
    };

    let variants: Vec<Variant> = rules
        .iter()
        .enumerate()
        .filter_map(|(idx, rule)| rule.map(|r| (idx, r)))
        .flat_map(|(idx, rule)| {
            rule.terms().iter().map(move |t| Variant {
                target: idx,
                shift: t.shift,
                coeff: t.coeff,
            })
        })
        .collect();

    let with_unshifted = target == ShiftTarget::Weights;
    let n_batches = variants.len() + usize::from(with_unshifted);
    let mut bound = Vec::with_capacity(n_batches * batch);
    if with_unshifted {
        bind_rows(circuit, weights, x, &mut bound)?;
    }
    for v in &variants {
        match target {
            ShiftTarget::Weights => {
                let mut shifted = weights.to_vec();
                shifted[v.target] += v.shift;
                bind_rows(circuit, &shifted, x, &mut bound)?;
            }
            ShiftTarget::Inputs => {
                let mut shifted = x.clone();
                shifted.column_mut(v.target).mapv_inplace(|a| a + v.shift);
                bind_rows(circuit, weights, &shifted, &mut bound)?;
            }
        }
    }

    debug!(
        "{} shifted evaluations over {} targets, {} circuits",
        variants.len(),
        n_targets,
        bound.len()
    );
    let rows = executor.execute(&bound).await?;
    if rows.len() != bound.len() {
        return Err(NodeError::ShapeMismatch(format!(
            "executor returned {} results for {} circuits",
            rows.len(),
            bound.len()
        )));
    }

    let mut chunks = rows.chunks(batch);
    let circuit_out = if with_unshifted {
        let chunk = chunks
            .next()
            .ok_or_else(|| NodeError::ShapeMismatch("missing unshifted batch".into()))?;
        Some(MeasureAll::stack(chunk, n_wires)?)
    } else {
        None
    };

    let mut jacobian: Vec<Array2<f64>> = vec![Array2::zeros((batch, n_wires)); n_targets];
    for v in &variants {
        let chunk = chunks
            .next()
            .ok_or_else(|| NodeError::ShapeMismatch("missing shifted batch".into()))?;
        jacobian[v.target].scaled_add(v.coeff, &MeasureAll::stack(chunk, n_wires)?);
    }

    Ok(ShiftOutput {
        circuit_out,
        jacobian,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use qnode_adapter_sim::SimulatorBackend;
    use qnode_hal::{BackendAvailability, Capabilities, ExecutionResult, HalResult, JobId, JobStatus};
    use qnode_ir::GateOp;

    fn ry_circuit() -> ParametricCircuit {
        // ⟨Z0⟩ = cos(x0 + w0), ⟨Z1⟩ = cos(w1).
        let mut c = ParametricCircuit::new("ry", 2);
        c.push_input(GateOp::Ry, &[0], 0).unwrap();
        c.push_trainable(GateOp::Ry, &[0]).unwrap();
        c.push_trainable(GateOp::Ry, &[1]).unwrap();
        c
    }

    #[tokio::test]
    async fn test_process_parameterized() {
        let exec = SimulatorExecutor::new();
        let x = array![[0.3], [0.0]];
        let out = process_parameterized(&exec, &ry_circuit(), &[0.2, 1.0], &x)
            .await
            .unwrap();
        assert_eq!(out.dim(), (2, 2));
        assert!((out[[0, 0]] - 0.5f64.cos()).abs() < 1e-12);
        assert!((out[[1, 0]] - 0.2f64.cos()).abs() < 1e-12);
        assert!((out[[1, 1]] - 1.0f64.cos()).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_weight_shift_is_exact() {
        let exec = SimulatorExecutor::new();
        let x = array![[0.3], [-0.7]];
        let out = process_parameterized_and_shift(
            &exec,
            &ry_circuit(),
            &[0.2, 1.0],
            &x,
            ShiftTarget::Weights,
        )
        .await
        .unwrap();
        let unshifted = out.circuit_out.unwrap();
        assert_eq!(unshifted.dim(), (2, 2));
        assert_eq!(out.jacobian.len(), 2);
        for (b, x0) in [0.3f64, -0.7].into_iter().enumerate() {
            assert!((out.jacobian[0][[b, 0]] + (x0 + 0.2).sin()).abs() < 1e-12);
            assert!(out.jacobian[0][[b, 1]].abs() < 1e-12);
            assert!((out.jacobian[1][[b, 1]] + 1.0f64.sin()).abs() < 1e-12);
        }
    }

    #[tokio::test]
    async fn test_input_shift_skips_unused_columns() {
        let exec = SimulatorExecutor::new();
        let x = array![[0.3, 9.0]];
        let out = process_parameterized_and_shift(
            &exec,
            &ry_circuit(),
            &[0.2, 1.0],
            &x,
            ShiftTarget::Inputs,
        )
        .await
        .unwrap();
        assert!(out.circuit_out.is_none());
        assert_eq!(out.jacobian.len(), 2);
        assert!((out.jacobian[0][[0, 0]] + 0.5f64.sin()).abs() < 1e-12);
        assert!(out.jacobian[1].iter().all(|&v| v == 0.0));
    }

    #[tokio::test]
    async fn test_batch_checks() {
        let exec = SimulatorExecutor::new();
        let c = ry_circuit();
        let empty = Array2::<f64>::zeros((0, 1));
        assert!(process_parameterized(&exec, &c, &[0.0, 0.0], &empty).await.is_err());
        let narrow = Array2::<f64>::zeros((1, 0));
        assert!(process_parameterized(&exec, &c, &[0.0, 0.0], &narrow).await.is_err());
        let x = array![[0.0]];
        assert!(process_parameterized(&exec, &c, &[0.0], &x).await.is_err());
    }

    #[tokio::test]
    async fn test_hardware_chunks_jobs() {
        let backend = Arc::new(SimulatorBackend::new().with_seed(1));
        let hw = HardwareProcessor::new(backend, 2000).with_max_circuits_per_job(3);
        assert_eq!(hw.max_circuits_per_job(), 3);
        assert!(hw.is_hardware());

        let x = array![[0.0], [0.4], [1.1], [2.0], [3.0]];
        let out = process_parameterized(&hw, &ry_circuit(), &[0.0, 0.0], &x)
            .await
            .unwrap();
        assert_eq!(out.dim(), (5, 2));
        for (b, x0) in [0.0f64, 0.4, 1.1, 2.0, 3.0].into_iter().enumerate() {
            assert!((out[[b, 0]] - x0.cos()).abs() < 0.1);
            assert_eq!(out[[b, 1]], 1.0);
        }
    }

    #[tokio::test]
    async fn test_hardware_rejects_oversized_circuit() {
        let backend = Arc::new(SimulatorBackend::with_max_qubits(1));
        let hw = HardwareProcessor::new(backend, 100);
        let err = process_parameterized(&hw, &ry_circuit(), &[0.0, 0.0], &array![[0.0]])
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Hal(HalError::InvalidCircuit(_))));
    }

    struct OfflineBackend {
        caps: Capabilities,
    }

    #[async_trait]
    impl Backend for OfflineBackend {
        fn name(&self) -> &str {
            "offline"
        }
        fn capabilities(&self) -> &Capabilities {
            &self.caps
        }
        async fn availability(&self) -> HalResult<BackendAvailability> {
            Ok(BackendAvailability::unavailable("maintenance"))
        }
        async fn submit(&self, _: &[Circuit], _: u32) -> HalResult<JobId> {
            Err(HalError::SubmissionFailed("offline".into()))
        }
        async fn status(&self, job_id: &JobId) -> HalResult<JobStatus> {
            Err(HalError::JobNotFound(job_id.0.clone()))
        }
        async fn result(&self, job_id: &JobId) -> HalResult<ExecutionResult> {
            Err(HalError::JobNotFound(job_id.0.clone()))
        }
        async fn cancel(&self, _: &JobId) -> HalResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_hardware_unavailable() {
        let backend = Arc::new(OfflineBackend {
            caps: Capabilities::simulator(4),
        });
        let hw = HardwareProcessor::new(backend, 100);
        let err = process_parameterized(&hw, &ry_circuit(), &[0.0, 0.0], &array![[0.0]])
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Hal(HalError::BackendUnavailable(msg)) if msg == "maintenance"));
    }
}
