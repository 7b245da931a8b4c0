//! Shot-sampling simulator backend.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, instrument};
use uuid::Uuid;

use qnode_hal::{
    Backend, BackendAvailability, BackendConfig, BackendFactory, Capabilities, Counts,
    ExecutionResult, HalError, HalResult, Job, JobId, JobStatus,
};
use qnode_ir::Circuit;

use crate::statevector::Statevector;

/// Job data for the simulator.
struct SimJob {
    job: Job,
    result: Option<ExecutionResult>,
}

/// Local sampling backend.
///
/// Each circuit is simulated once; `shots` outcomes are then drawn from the
/// final distribution. An optional symmetric readout error flips every
/// measured bit independently, which makes this backend a cheap stand-in
/// for noisy hardware when exercising the hardware-in-the-loop path.
pub struct SimulatorBackend {
    /// Backend configuration.
    config: BackendConfig,
    /// Capabilities, fixed at construction.
    capabilities: Capabilities,
    /// Active jobs.
    jobs: Arc<Mutex<FxHashMap<String, SimJob>>>,
    /// Probability of flipping each measured bit.
    readout_error: f64,
    /// Sampling RNG.
    rng: Mutex<StdRng>,
}

impl SimulatorBackend {
    /// Create a new simulator backend with default settings.
    pub fn new() -> Self {
        Self::with_max_qubits(20)
    }

    /// Create a simulator with custom max qubits.
    pub fn with_max_qubits(max_qubits: u32) -> Self {
        Self {
            config: BackendConfig::new("simulator"),
            capabilities: Capabilities::simulator(max_qubits),
            jobs: Arc::new(Mutex::new(FxHashMap::default())),
            readout_error: 0.0,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Set the symmetric readout error probability.
    pub fn with_readout_error(mut self, p: f64) -> Self {
        self.readout_error = p.clamp(0.0, 1.0);
        self
    }

    /// Make sampling reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Readout error probability.
    pub fn readout_error(&self) -> f64 {
        self.readout_error
    }

    /// Jobs submitted but not yet collected with `result()`.
    pub fn active_jobs(&self) -> usize {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Sample one circuit.
    fn sample_circuit(&self, circuit: &Circuit, shots: u32, rng: &mut StdRng) -> Counts {
        let sv = Statevector::from_circuit(circuit);
        let mut cumulative = sv.probabilities();
        let mut acc = 0.0;
        for p in &mut cumulative {
            acc += *p;
            *p = acc;
        }

        let mut outcomes: FxHashMap<usize, u64> = FxHashMap::default();
        for _ in 0..shots {
            let r: f64 = rng.r#gen::<f64>() * acc;
            let mut outcome = cumulative
                .partition_point(|&c| c <= r)
                .min(cumulative.len() - 1);
            if self.readout_error > 0.0 {
                for wire in 0..sv.num_qubits() {
                    if rng.gen_bool(self.readout_error) {
                        outcome ^= 1 << wire;
                    }
                }
            }
            *outcomes.entry(outcome).or_insert(0) += 1;
        }

        let mut counts = Counts::new();
        for (outcome, n) in outcomes {
            counts.insert(sv.outcome_to_bitstring(outcome), n);
        }
        counts
    }

    /// Run a batch synchronously.
    #[instrument(skip(self, circuits))]
    fn run_batch(&self, circuits: &[Circuit], shots: u32) -> ExecutionResult {
        let start = Instant::now();
        debug!("Sampling {} circuits, {} shots each", circuits.len(), shots);

        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let counts = circuits
            .iter()
            .map(|c| self.sample_circuit(c, shots, &mut rng))
            .collect();

        let elapsed = start.elapsed();
        debug!("Batch completed in {:?}", elapsed);

        ExecutionResult::new(counts, shots).with_execution_time(elapsed.as_millis() as u64)
    }
}

impl Default for SimulatorBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for SimulatorBackend {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn availability(&self) -> HalResult<BackendAvailability> {
        Ok(BackendAvailability::always_available())
    }

    #[instrument(skip(self, circuits))]
    async fn submit(&self, circuits: &[Circuit], shots: u32) -> HalResult<JobId> {
        if shots == 0 || shots > self.capabilities.max_shots {
            return Err(HalError::InvalidShots(format!(
                "{shots} shots requested, simulator accepts 1..={}",
                self.capabilities.max_shots
            )));
        }
        if circuits.len() > self.capabilities.max_circuits_per_job {
            return Err(HalError::SubmissionFailed(format!(
                "{} circuits in one job, limit is {}",
                circuits.len(),
                self.capabilities.max_circuits_per_job
            )));
        }
        for circuit in circuits {
            if circuit.num_qubits() > self.capabilities.num_qubits as usize {
                return Err(HalError::CircuitTooLarge(format!(
                    "Circuit has {} qubits but simulator only supports {}",
                    circuit.num_qubits(),
                    self.capabilities.num_qubits
                )));
            }
        }

        let job_id = JobId::new(Uuid::new_v4().to_string());
        let job = Job::new(job_id.clone(), shots, circuits.len());

        {
            let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
            jobs.insert(job_id.0.clone(), SimJob { job, result: None });
        }

        debug!("Submitted job: {}", job_id);

        // Sampling happens inline; the job is terminal by the time submit returns.
        let result = self.run_batch(circuits, shots);

        {
            let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(sim_job) = jobs.get_mut(&job_id.0) {
                sim_job.job.transition(JobStatus::Running);
                sim_job.result = Some(result);
                sim_job.job.transition(JobStatus::Completed);
            }
        }

        Ok(job_id)
    }

    async fn status(&self, job_id: &JobId) -> HalResult<JobStatus> {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        jobs.get(&job_id.0)
            .map(|j| j.job.status.clone())
            .ok_or_else(|| HalError::JobNotFound(job_id.0.clone()))
    }

    async fn result(&self, job_id: &JobId) -> HalResult<ExecutionResult> {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let status = jobs
            .get(&job_id.0)
            .map(|j| j.job.status.clone())
            .ok_or_else(|| HalError::JobNotFound(job_id.0.clone()))?;
        if !status.is_terminal() {
            return Err(HalError::JobFailed(format!(
                "job {job_id} has no result (status: {status})"
            )));
        }

        // Terminal jobs are released once collected.
        let sim_job = jobs
            .remove(&job_id.0)
            .ok_or_else(|| HalError::JobNotFound(job_id.0.clone()))?;
        let elapsed = sim_job
            .job
            .finished_at
            .map(|t| (t - sim_job.job.submitted_at).num_milliseconds());
        debug!(
            "Released job {} ({} circuits, {:?} ms)",
            job_id, sim_job.job.num_circuits, elapsed
        );
        match (sim_job.job.status, sim_job.result) {
            (JobStatus::Completed, Some(result)) => Ok(result),
            (JobStatus::Cancelled, _) => Err(HalError::JobCancelled),
            (JobStatus::Failed(msg), _) => Err(HalError::JobFailed(msg)),
            (status, _) => Err(HalError::JobFailed(format!(
                "job {job_id} has no result (status: {status})"
            ))),
        }
    }

    async fn cancel(&self, job_id: &JobId) -> HalResult<()> {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        match jobs.get_mut(&job_id.0) {
            Some(sim_job) => {
                sim_job.job.transition(JobStatus::Cancelled);
                Ok(())
            }
            None => Err(HalError::JobNotFound(job_id.0.clone())),
        }
    }
}

impl BackendFactory for SimulatorBackend {
    fn from_config(config: BackendConfig) -> HalResult<Self> {
        let max_qubits = config
            .extra
            .get("max_qubits")
            .and_then(serde_json::Value::as_u64)
            .map_or(Ok(20), u32::try_from)
            .map_err(|e| HalError::Configuration(format!("max_qubits: {e}")))?;
        let readout_error = config
            .extra
            .get("readout_error")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0);
        if !(0.0..=1.0).contains(&readout_error) {
            return Err(HalError::Configuration(format!(
                "readout_error must be in [0, 1], got {readout_error}"
            )));
        }

        let mut backend = Self::with_max_qubits(max_qubits).with_readout_error(readout_error);
        if let Some(seed) = config.extra.get("seed").and_then(serde_json::Value::as_u64) {
            backend = backend.with_seed(seed);
        }
        backend.config = config;
        Ok(backend)
    }
}
