//! Hardware-in-the-loop path against the shot-sampling backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ndarray::{Array2, array};
use qnode_adapter_sim::SimulatorBackend;
use qnode_core::{
    ActNorm, CircuitExecutor, HardwareProcessor, NodeArch, NodeError, SimulatorExecutor,
    build_nodes,
};
use qnode_hal::{
    Backend, BackendAvailability, Capabilities, ExecutionResult, HalError, HalResult, JobId,
    JobStatus,
};
use qnode_ir::Circuit;

/// Forwards to the sampling simulator and counts submitted jobs.
struct CountingBackend {
    inner: SimulatorBackend,
    capabilities: Capabilities,
    jobs: AtomicUsize,
}

impl CountingBackend {
    fn new(max_circuits_per_job: usize) -> Self {
        let mut capabilities = Capabilities::simulator(8);
        capabilities.max_circuits_per_job = max_circuits_per_job;
        Self {
            inner: SimulatorBackend::new().with_seed(17),
            capabilities,
            jobs: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Backend for CountingBackend {
    fn name(&self) -> &str {
        "counting"
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn availability(&self) -> HalResult<BackendAvailability> {
        self.inner.availability().await
    }

    async fn submit(&self, circuits: &[Circuit], shots: u32) -> HalResult<JobId> {
        if circuits.len() > self.capabilities.max_circuits_per_job {
            return Err(HalError::SubmissionFailed("batch too large".into()));
        }
        self.jobs.fetch_add(1, Ordering::SeqCst);
        self.inner.submit(circuits, shots).await
    }

    async fn status(&self, job_id: &JobId) -> HalResult<JobStatus> {
        self.inner.status(job_id).await
    }

    async fn result(&self, job_id: &JobId) -> HalResult<ExecutionResult> {
        self.inner.result(job_id).await
    }

    async fn cancel(&self, job_id: &JobId) -> HalResult<()> {
        self.inner.cancel(job_id).await
    }
}

fn archs() -> [NodeArch; 2] {
    [
        NodeArch::new(2, "2_ry", "u3cu3_s0").with_seed(4),
        NodeArch::new(2, "2_rx", "cu3_s0").with_seed(5),
    ]
}

fn max_abs_diff(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

#[tokio::test]
async fn hardware_forward_approximates_simulator() {
    let x = array![[0.3, -0.2], [1.1, 0.8], [-0.5, 2.0]];

    let mut exact_nodes = build_nodes(&archs(), ActNorm::None).unwrap();
    let exact = exact_nodes
        .forward(&x, &SimulatorExecutor::new())
        .await
        .unwrap();

    let backend = Arc::new(SimulatorBackend::new().with_seed(7));
    let hw = HardwareProcessor::new(backend, 50_000);
    let mut hw_nodes = build_nodes(&archs(), ActNorm::None).unwrap();
    let sampled = hw_nodes.forward(&x, &hw).await.unwrap();

    assert_eq!(sampled.dim(), exact.dim());
    assert!(max_abs_diff(&exact, &sampled) < 0.05);
}

#[tokio::test]
async fn hardware_gradients_approximate_simulator() {
    let x = array![[0.3, -0.2], [1.1, 0.8]];
    let upstream = array![[1.0, -1.0], [0.5, 0.5]];

    let mut exact_nodes = build_nodes(&archs(), ActNorm::None).unwrap();
    exact_nodes
        .shift_and_run(&x, &SimulatorExecutor::new())
        .await
        .unwrap();
    let exact = exact_nodes.backward(&upstream).unwrap();

    let backend = Arc::new(SimulatorBackend::new().with_seed(11));
    let hw = HardwareProcessor::new(backend, 50_000);
    let mut hw_nodes = build_nodes(&archs(), ActNorm::None).unwrap();
    hw_nodes.shift_and_run(&x, &hw).await.unwrap();
    let sampled = hw_nodes.backward(&upstream).unwrap();

    for (e, s) in exact.iter().flatten().zip(sampled.iter().flatten()) {
        assert!((e - s).abs() < 0.1, "{e} vs {s}");
    }
}

#[tokio::test]
async fn shifted_batches_are_chunked_into_jobs() {
    let backend = Arc::new(CountingBackend::new(10));
    let hw = HardwareProcessor::new(backend.clone(), 256);
    assert_eq!(hw.max_circuits_per_job(), 10);

    // First node, u3cu3 on 2 wires: 10 two-term angles (U3, CU3 φ and λ)
    // and 2 four-term CU3 θ; inputs are not shifted.
    let mut nodes =
        build_nodes(&[NodeArch::new(2, "2_ry", "u3cu3_s0").with_seed(0)], ActNorm::None).unwrap();
    let x = array![[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]];
    nodes.shift_and_run(&x, &hw).await.unwrap();

    // (1 unshifted + 10 · 2 + 2 · 4) evaluations × 3 rows.
    let circuits: usize = (1 + 10 * 2 + 2 * 4) * 3;
    assert_eq!(backend.jobs.load(Ordering::SeqCst), circuits.div_ceil(10));
    assert_eq!(backend.inner.active_jobs(), 0);
}

#[tokio::test]
async fn training_steps_do_not_retain_jobs() {
    let backend = Arc::new(CountingBackend::new(16));
    let hw = HardwareProcessor::new(backend.clone(), 64);
    let mut nodes = build_nodes(&archs(), ActNorm::None).unwrap();
    let x = array![[0.1, 0.2], [0.3, 0.4]];
    for _ in 0..5 {
        let y = nodes.shift_and_run(&x, &hw).await.unwrap();
        let grads = nodes.backward(&y).unwrap();
        nodes.sgd_step(&grads, 0.01).unwrap();
    }
    assert!(backend.jobs.load(Ordering::SeqCst) > 5);
    assert_eq!(backend.inner.active_jobs(), 0);
}

#[tokio::test]
async fn readout_error_biases_towards_zero() {
    let x = array![[0.0, 0.0]];
    let arch = NodeArch::new(2, "2_ry", "ryrycx").with_seed(0);
    let mut nodes = build_nodes(&[arch], ActNorm::None).unwrap();
    for w in nodes.nodes_mut()[0].parameters_mut() {
        *w = 0.0;
    }

    let noisy = Arc::new(SimulatorBackend::new().with_seed(3).with_readout_error(0.1));
    let hw = HardwareProcessor::new(noisy, 20_000);
    let y = nodes.forward(&x, &hw).await.unwrap();
    // ⟨Z⟩ = 1 − 2p for a |0⟩ wire.
    for v in y.iter() {
        assert!((v - 0.8).abs() < 0.03, "{v}");
    }
}

#[tokio::test]
async fn executor_errors_surface_as_node_errors() {
    let backend = Arc::new(SimulatorBackend::with_max_qubits(1));
    let hw: Arc<dyn CircuitExecutor> = Arc::new(HardwareProcessor::new(backend, 100));
    let mut nodes =
        build_nodes(&[NodeArch::new(2, "2_ry", "ryrycx").with_seed(0)], ActNorm::None).unwrap();
    let err = nodes.forward(&array![[0.0, 0.0]], hw.as_ref()).await.unwrap_err();
    assert!(matches!(err, NodeError::Hal(_)));
}
