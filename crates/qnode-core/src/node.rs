//! The quantum node: encoder, variational layer and measurement, followed
//! by activation noise and normalization.

use ndarray::{Array2, Axis};
use qnode_ir::ParametricCircuit;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, instrument};

use crate::config::NodeArch;
use crate::encoder::GeneralEncoder;
use crate::error::{NodeError, NodeResult};
use crate::layer::VariationalLayer;
use crate::measure::MeasureAll;
use crate::noise::ActivationNoise;
use crate::norm::{ActNorm, MeanStd};
use crate::pipeline::QuantumNodeList;
use crate::processor::{
    CircuitExecutor, ShiftTarget, SimulatorExecutor, bind_rows, check_batch,
    process_parameterized, process_parameterized_and_shift,
};

/// Intermediate activations recorded by the last forward pass.
#[derive(Debug, Clone, Default)]
pub struct NodeTrace {
    /// Batch fed to the encoder.
    pub circuit_in: Option<Array2<f64>>,
    /// Measured ⟨Z⟩ per wire.
    pub circuit_out: Option<Array2<f64>>,
    /// Input to the first noise stage.
    pub x_before_add_noise: Option<Array2<f64>>,
    /// Input to the normalization.
    pub x_before_norm: Option<Array2<f64>>,
    /// Input to the second noise stage.
    pub x_before_add_noise_second: Option<Array2<f64>>,
    /// Final node output.
    pub x_before_act_quant: Option<Array2<f64>>,
    /// Whether the pass ran as the last node.
    pub is_last_node: bool,
}

/// Gradients returned by [`QuantumNode::backward`].
#[derive(Debug, Clone)]
pub struct NodeGradients {
    /// `∂L/∂w` for every trainable weight.
    pub weights: Vec<f64>,
    /// `∂L/∂x`, `(batch × input columns)`; `None` on the first node.
    pub inputs: Option<Array2<f64>>,
    /// `∂L/∂(circuit output)`, `(batch × wires)`.
    pub circuit_out: Array2<f64>,
}

/// One stage of a hybrid pipeline.
#[derive(Debug, Clone)]
pub struct QuantumNode {
    arch: NodeArch,
    node_id: usize,
    encoder: GeneralEncoder,
    q_layer: VariationalLayer,
    measure: MeasureAll,
    circuit: ParametricCircuit,
    act_norm: ActNorm,
    noise_model: Option<ActivationNoise>,
    pre_specified_mean_std: Option<MeanStd>,
    rng: StdRng,
    trace: NodeTrace,
    /// `∂(circuit out)/∂w_k`, one `(batch × wires)` array per weight.
    grad_qlayer: Option<Vec<Array2<f64>>>,
    /// `∂(circuit out)/∂x_i`, one `(batch × wires)` array per input column.
    grad_encoder: Option<Vec<Array2<f64>>>,
}

impl QuantumNode {
    /// Build node `node_id` from its architecture.
    pub fn new(arch: NodeArch, node_id: usize, act_norm: ActNorm) -> NodeResult<Self> {
        arch.validate()?;
        let encoder = GeneralEncoder::from_name(&arch.encoder_op_list_name)?;
        let q_layer = VariationalLayer::from_arch(&arch)?;

        let mut circuit = ParametricCircuit::new(format!("node{node_id}"), arch.n_wires);
        encoder.append_to(&mut circuit)?;
        q_layer.append_to(&mut circuit)?;

        let rng = arch.seed.map_or_else(StdRng::from_entropy, |s| {
            StdRng::seed_from_u64(s.wrapping_add(node_id as u64 + 1))
        });
        debug!(
            node_id,
            encoder = encoder.name(),
            layer = q_layer.name(),
            ops = circuit.len(),
            "built quantum node"
        );

        Ok(Self {
            arch,
            node_id,
            encoder,
            q_layer,
            measure: MeasureAll::pauli_z(),
            circuit,
            act_norm,
            noise_model: None,
            pre_specified_mean_std: None,
            rng,
            trace: NodeTrace::default(),
            grad_qlayer: None,
            grad_encoder: None,
        })
    }

    /// Node architecture.
    pub fn arch(&self) -> &NodeArch {
        &self.arch
    }

    /// Position in the pipeline.
    pub fn node_id(&self) -> usize {
        self.node_id
    }

    /// Number of wires, which is also the output width.
    pub fn n_wires(&self) -> usize {
        self.arch.n_wires as usize
    }

    /// The encoder.
    pub fn encoder(&self) -> &GeneralEncoder {
        &self.encoder
    }

    /// The variational layer.
    pub fn q_layer(&self) -> &VariationalLayer {
        &self.q_layer
    }

    /// The measurement.
    pub fn measure(&self) -> &MeasureAll {
        &self.measure
    }

    /// Encoder followed by the variational layer.
    pub fn circuit(&self) -> &ParametricCircuit {
        &self.circuit
    }

    /// Normalization applied after measurement.
    pub fn act_norm(&self) -> ActNorm {
        self.act_norm
    }

    /// Trainable weights.
    pub fn parameters(&self) -> &[f64] {
        self.q_layer.parameters()
    }

    /// Mutable trainable weights.
    pub fn parameters_mut(&mut self) -> &mut [f64] {
        self.q_layer.parameters_mut()
    }

    /// Number of trainable weights.
    pub fn num_parameters(&self) -> usize {
        self.q_layer.num_params()
    }

    /// Activation noise, if any.
    pub fn noise_model(&self) -> Option<&ActivationNoise> {
        self.noise_model.as_ref()
    }

    /// Mutable activation noise, for epoch and mode changes.
    pub fn noise_model_mut(&mut self) -> Option<&mut ActivationNoise> {
        self.noise_model.as_mut()
    }

    /// Attach or remove activation noise.
    pub fn set_noise_model(&mut self, noise: Option<ActivationNoise>) {
        self.noise_model = noise;
    }

    /// Fixed statistics used by `batch_norm` instead of batch statistics.
    pub fn pre_specified_mean_std(&self) -> Option<&MeanStd> {
        self.pre_specified_mean_std.as_ref()
    }

    /// Set or clear the fixed `batch_norm` statistics.
    pub fn set_pre_specified_mean_std(&mut self, stats: Option<MeanStd>) -> NodeResult<()> {
        if let Some(ms) = &stats {
            ms.validate(self.n_wires())?;
        }
        self.pre_specified_mean_std = stats;
        Ok(())
    }

    /// Activations recorded by the last forward pass.
    pub fn trace(&self) -> &NodeTrace {
        &self.trace
    }

    /// Weight Jacobians from the last [`QuantumNode::shift_and_run`].
    pub fn grad_qlayer(&self) -> Option<&[Array2<f64>]> {
        self.grad_qlayer.as_deref()
    }

    /// Input Jacobians from the last [`QuantumNode::shift_and_run`]; `None` on the first node.
    pub fn grad_encoder(&self) -> Option<&[Array2<f64>]> {
        self.grad_encoder.as_deref()
    }

    /// Run encoder, layer and measurement on the exact simulator.
    pub fn run_circuit(&self, inputs: &Array2<f64>) -> NodeResult<Array2<f64>> {
        let weights = self.q_layer.parameters();
        check_batch(&self.circuit, weights, inputs)?;
        let mut bound = Vec::with_capacity(inputs.nrows());
        bind_rows(&self.circuit, weights, inputs, &mut bound)?;
        let exec = SimulatorExecutor::new();
        let rows: Vec<_> = bound.iter().map(|c| exec.run(c)).collect();
        MeasureAll::stack(&rows, self.n_wires())
    }

    /// Run the circuit on `x` through `executor`, then noise and normalization.
    ///
    /// Invalidates gradients from an earlier [`QuantumNode::shift_and_run`].
    #[instrument(skip_all, fields(node = self.node_id, batch = x.nrows(), executor = executor.name()))]
    pub async fn forward(
        &mut self,
        x: &Array2<f64>,
        executor: &dyn CircuitExecutor,
        is_last_node: bool,
    ) -> NodeResult<Array2<f64>> {
        let circuit_out =
            process_parameterized(executor, &self.circuit, self.q_layer.parameters(), x).await?;
        self.grad_qlayer = None;
        self.grad_encoder = None;
        self.trace.circuit_in = Some(x.clone());
        self.post_process(circuit_out, is_last_node)
    }

    /// Forward pass that also records parameter-shift Jacobians.
    ///
    /// Weight Jacobians are always computed. Input Jacobians are skipped on
    /// the first node, whose inputs are data.
    #[instrument(skip_all, fields(node = self.node_id, batch = x.nrows(), executor = executor.name()))]
    pub async fn shift_and_run(
        &mut self,
        x: &Array2<f64>,
        executor: &dyn CircuitExecutor,
        is_last_node: bool,
        is_first_node: bool,
    ) -> NodeResult<Array2<f64>> {
        let weights = self.q_layer.parameters();
        let shifted =
            process_parameterized_and_shift(executor, &self.circuit, weights, x, ShiftTarget::Weights)
                .await?;
        let circuit_out = shifted
            .circuit_out
            .ok_or_else(|| NodeError::ShapeMismatch("missing unshifted output".into()))?;

        let grad_encoder = if is_first_node {
            None
        } else {
            let inputs =
                process_parameterized_and_shift(executor, &self.circuit, weights, x, ShiftTarget::Inputs)
                    .await?;
            Some(inputs.jacobian)
        };
        debug!(
            weights = shifted.jacobian.len(),
            inputs = grad_encoder.as_ref().map_or(0, Vec::len),
            "parameter-shift Jacobians ready"
        );

        self.grad_qlayer = Some(shifted.jacobian);
        self.grad_encoder = grad_encoder;
        self.trace.circuit_in = Some(x.clone());
        self.post_process(circuit_out, is_last_node)
    }

    fn post_process(&mut self, circuit_out: Array2<f64>, is_last_node: bool) -> NodeResult<Array2<f64>> {
        self.trace.circuit_out = Some(circuit_out.clone());
        self.trace.is_last_node = is_last_node;

        self.trace.x_before_add_noise = Some(circuit_out.clone());
        let x = self.add_noise(circuit_out, false)?;

        self.trace.x_before_norm = Some(x.clone());
        let x = self
            .act_norm
            .forward(&x, is_last_node, self.pre_specified_mean_std.as_ref())?;

        self.trace.x_before_add_noise_second = Some(x.clone());
        let x = self.add_noise(x, true)?;

        self.trace.x_before_act_quant = Some(x.clone());
        Ok(x)
    }

    fn add_noise(&mut self, x: Array2<f64>, is_after_norm: bool) -> NodeResult<Array2<f64>> {
        match &self.noise_model {
            Some(noise) => noise.add_noise(&x, self.node_id, is_after_norm, &mut self.rng),
            None => Ok(x),
        }
    }

    /// Chain `∂L/∂(node output)` back to the weights and inputs.
    ///
    /// Noise is additive and passes gradients through unchanged;
    /// normalization is differentiated analytically. Requires a preceding
    /// [`QuantumNode::shift_and_run`].
    pub fn backward(&self, grad_out: &Array2<f64>) -> NodeResult<NodeGradients> {
        let missing = || NodeError::MissingGradients(self.node_id);
        let grad_qlayer = self.grad_qlayer.as_ref().ok_or_else(missing)?;
        let x_norm_in = self.trace.x_before_norm.as_ref().ok_or_else(missing)?;
        let y_norm = self
            .trace
            .x_before_add_noise_second
            .as_ref()
            .ok_or_else(missing)?;
        if grad_out.dim() != y_norm.dim() {
            return Err(NodeError::ShapeMismatch(format!(
                "node {} output is {:?}, gradient is {:?}",
                self.node_id,
                y_norm.dim(),
                grad_out.dim()
            )));
        }

        let g = self.act_norm.backward(
            x_norm_in,
            y_norm,
            grad_out,
            self.trace.is_last_node,
            self.pre_specified_mean_std.as_ref(),
        )?;

        let weights = grad_qlayer.iter().map(|jac| (jac * &g).sum()).collect();
        let inputs = self.grad_encoder.as_ref().map(|jacobians| {
            let mut grad_x = Array2::<f64>::zeros((g.nrows(), jacobians.len()));
            for (i, jac) in jacobians.iter().enumerate() {
                grad_x
                    .column_mut(i)
                    .assign(&(jac * &g).sum_axis(Axis(1)));
            }
            grad_x
        });

        Ok(NodeGradients {
            weights,
            inputs,
            circuit_out: g,
        })
    }
}

/// Build one node per architecture, sharing the normalization.
pub fn build_nodes(node_archs: &[NodeArch], act_norm: ActNorm) -> NodeResult<QuantumNodeList> {
    let nodes = node_archs
        .iter()
        .enumerate()
        .map(|(i, arch)| QuantumNode::new(arch.clone(), i, act_norm))
        .collect::<NodeResult<Vec<_>>>()?;
    QuantumNodeList::new(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LAYER_NAMES;
    use ndarray::array;
    use std::f64::consts::PI;

    fn node(layer: &str, encoder: &str, act_norm: ActNorm) -> QuantumNode {
        let arch = NodeArch::new(2, encoder, layer).with_blocks(1).with_seed(11);
        QuantumNode::new(arch, 0, act_norm).unwrap()
    }

    /// Central differences of `sum(weights ⊙ forward)` w.r.t. the trainable weights.
    fn numeric_weight_grad(n: &QuantumNode, x: &Array2<f64>, upstream: &Array2<f64>) -> Vec<f64> {
        let h = 1e-5;
        let loss = |n: &QuantumNode| -> f64 {
            let out = n.run_circuit(x).unwrap();
            let y = n.act_norm().forward(&out, false, None).unwrap();
            (y * upstream).sum()
        };
        (0..n.num_parameters())
            .map(|k| {
                let mut plus = n.clone();
                plus.parameters_mut()[k] += h;
                let mut minus = n.clone();
                minus.parameters_mut()[k] -= h;
                (loss(&plus) - loss(&minus)) / (2.0 * h)
            })
            .collect()
    }

    #[test]
    fn test_run_circuit_shape() {
        let n = node("u3cu3_s0", "2_ry", ActNorm::None);
        let out = n.run_circuit(&array![[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]]).unwrap();
        assert_eq!(out.dim(), (3, 2));
        assert!(out.iter().all(|v| v.abs() <= 1.0 + 1e-12));
    }

    #[tokio::test]
    async fn test_forward_records_trace() {
        let mut n = node("ryrycx", "2_ry", ActNorm::LayerNorm);
        let exec = SimulatorExecutor::new();
        let x = array![[0.1, 0.2], [0.7, -0.4]];
        let y = n.forward(&x, &exec, false).await.unwrap();
        let trace = n.trace();
        assert_eq!(trace.circuit_in.as_ref(), Some(&x));
        assert_eq!(trace.circuit_out, trace.x_before_add_noise);
        assert_eq!(trace.x_before_add_noise, trace.x_before_norm);
        assert_eq!(trace.x_before_act_quant.as_ref(), Some(&y));
        assert_eq!(trace.circuit_out.as_ref().unwrap(), &n.run_circuit(&x).unwrap());
        assert!(n.grad_qlayer().is_none());
    }

    #[tokio::test]
    async fn test_shift_gradients_match_finite_differences() {
        for layer in LAYER_NAMES {
            let mut n = node(layer, "2_rx", ActNorm::None);
            let exec = SimulatorExecutor::new();
            let x = array![[0.3, -1.2], [2.0, 0.5]];
            n.shift_and_run(&x, &exec, true, true).await.unwrap();
            let upstream = array![[1.0, -0.5], [0.25, 2.0]];
            let grads = n.backward(&upstream).unwrap();
            let numeric = numeric_weight_grad(&n, &x, &upstream);
            for (k, (a, b)) in grads.weights.iter().zip(&numeric).enumerate() {
                assert!((a - b).abs() < 1e-6, "{layer} weight {k}: {a} vs {b}");
            }
        }
    }

    #[tokio::test]
    async fn test_gradients_through_layer_norm() {
        // Two wires would make every normalized row ±1/√2.
        let arch = NodeArch::new(3, "3_ry", "u3cu3_s0").with_seed(11);
        let mut n = QuantumNode::new(arch, 0, ActNorm::LayerNorm).unwrap();
        let exec = SimulatorExecutor::new();
        let x = array![[0.3, -1.2, 0.7], [2.0, 0.5, -0.1], [0.1, 0.9, 1.4]];
        n.shift_and_run(&x, &exec, false, true).await.unwrap();
        let upstream = array![[1.0, -0.5, 0.2], [0.25, 2.0, -0.7], [-1.0, 0.3, 0.6]];
        let grads = n.backward(&upstream).unwrap();
        let numeric = numeric_weight_grad(&n, &x, &upstream);
        for (a, b) in grads.weights.iter().zip(&numeric) {
            assert!((a - b).abs() < 1e-5, "{a} vs {b}");
        }
    }

    #[tokio::test]
    async fn test_input_gradients() {
        let arch = NodeArch::new(2, "2_ry", "cu3_s0").with_seed(5);
        let mut n = QuantumNode::new(arch, 1, ActNorm::None).unwrap();
        let exec = SimulatorExecutor::new();
        let x = array![[0.4, -0.8]];
        n.shift_and_run(&x, &exec, true, false).await.unwrap();
        assert_eq!(n.grad_encoder().map(<[_]>::len), Some(2));

        let upstream = array![[1.0, 1.0]];
        let grads = n.backward(&upstream).unwrap();
        let grad_x = grads.inputs.unwrap();
        let h = 1e-5;
        for i in 0..2 {
            let mut plus = x.clone();
            plus[[0, i]] += h;
            let mut minus = x.clone();
            minus[[0, i]] -= h;
            let numeric =
                (n.run_circuit(&plus).unwrap().sum() - n.run_circuit(&minus).unwrap().sum()) / (2.0 * h);
            assert!((grad_x[[0, i]] - numeric).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn test_first_node_has_no_encoder_grads() {
        let mut n = node("u3cu3_s0", "2_ry", ActNorm::None);
        let exec = SimulatorExecutor::new();
        n.shift_and_run(&array![[0.1, 0.2]], &exec, false, true)
            .await
            .unwrap();
        assert!(n.grad_encoder().is_none());
        assert_eq!(n.grad_qlayer().map(<[_]>::len), Some(n.num_parameters()));
        assert!(n.backward(&array![[1.0, 1.0]]).unwrap().inputs.is_none());
    }

    #[tokio::test]
    async fn test_backward_requires_shift() {
        let mut n = node("ryrycx", "2_ry", ActNorm::None);
        assert!(matches!(
            n.backward(&array![[1.0, 1.0]]),
            Err(NodeError::MissingGradients(0))
        ));
        let exec = SimulatorExecutor::new();
        let x = array![[0.1, 0.2]];
        n.shift_and_run(&x, &exec, true, true).await.unwrap();
        assert!(n.backward(&array![[1.0, 1.0, 1.0]]).is_err());
        n.forward(&x, &exec, true).await.unwrap();
        assert!(n.backward(&array![[1.0, 1.0]]).is_err());
    }

    #[tokio::test]
    async fn test_no_last_norm_skipped_on_last_node() {
        let mut n = node("ryrycx", "2_ry", ActNorm::BatchNormNoLast);
        let exec = SimulatorExecutor::new();
        let x = array![[0.1, 0.2], [1.3, -0.4]];
        let y = n.forward(&x, &exec, true).await.unwrap();
        assert_eq!(Some(&y), n.trace().circuit_out.as_ref());
        let y = n.forward(&x, &exec, false).await.unwrap();
        assert_ne!(Some(&y), n.trace().circuit_out.as_ref());
    }

    #[tokio::test]
    async fn test_pre_specified_mean_std() {
        let mut n = node("ryrycx", "2_ry", ActNorm::BatchNorm);
        assert!(
            n.set_pre_specified_mean_std(Some(MeanStd {
                mean: vec![0.0],
                std: vec![1.0],
            }))
            .is_err()
        );
        n.set_pre_specified_mean_std(Some(MeanStd {
            mean: vec![0.0, 0.0],
            std: vec![2.0, 2.0],
        }))
        .unwrap();
        let exec = SimulatorExecutor::new();
        // A single-sample batch is fine with fixed statistics.
        let x = array![[0.3, 0.6]];
        let y = n.forward(&x, &exec, false).await.unwrap();
        let raw = n.run_circuit(&x).unwrap();
        assert_eq!(y, raw / 2.0);
    }

    #[tokio::test]
    async fn test_noise_in_train_and_eval() {
        let mut n = node("ryrycx", "2_ry", ActNorm::None);
        n.set_noise_model(Some(ActivationNoise::new(vec![0.5], vec![0.0]).unwrap()));
        let exec = SimulatorExecutor::new();
        let x = array![[PI / 3.0, 0.2]];
        let y = n.forward(&x, &exec, true).await.unwrap();
        let raw = n.run_circuit(&x).unwrap();
        assert_eq!(y, &raw + 0.5);

        if let Some(noise) = n.noise_model_mut() {
            noise.set_mode(crate::noise::NoiseMode::Eval);
        }
        let y = n.forward(&x, &exec, true).await.unwrap();
        assert_eq!(y, raw);
    }

    #[test]
    fn test_build_nodes() {
        let archs = vec![
            NodeArch::new(4, "4x4_ryzxy", "u3cu3_s0").with_seed(0),
            NodeArch::new(4, "4_ry", "u3cu3_s0").with_seed(1),
        ];
        let nodes = build_nodes(&archs, ActNorm::BatchNormNoLast).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes.nodes()[1].node_id(), 1);
        assert_eq!(nodes.num_parameters(), 2 * 24);
    }
}
