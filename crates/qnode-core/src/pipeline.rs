//! Ordered lists of quantum nodes.

use ndarray::Array2;
use tracing::{info, instrument};

use crate::error::{NodeError, NodeResult};
use crate::node::QuantumNode;
use crate::noise::{ActivationNoise, NoiseMode};
use crate::norm::MeanStd;
use crate::processor::CircuitExecutor;

/// Nodes run in sequence, each feeding its activations to the next encoder.
#[derive(Debug, Clone)]
pub struct QuantumNodeList {
    nodes: Vec<QuantumNode>,
}

impl QuantumNodeList {
    /// Chain nodes; each encoder must read exactly the previous node's wires.
    pub fn new(nodes: Vec<QuantumNode>) -> NodeResult<Self> {
        if nodes.is_empty() {
            return Err(NodeError::Config("node list is empty".into()));
        }
        for pair in nodes.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.encoder().n_inputs() != prev.n_wires() {
                return Err(NodeError::Config(format!(
                    "node {} reads {} inputs, node {} outputs {}",
                    next.node_id(),
                    next.encoder().n_inputs(),
                    prev.node_id(),
                    prev.n_wires()
                )));
            }
        }
        Ok(Self { nodes })
    }

    /// The nodes, in order.
    pub fn nodes(&self) -> &[QuantumNode] {
        &self.nodes
    }

    /// Mutable nodes.
    pub fn nodes_mut(&mut self) -> &mut [QuantumNode] {
        &mut self.nodes
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false for a constructed list.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Trainable weights across all nodes.
    pub fn num_parameters(&self) -> usize {
        self.nodes.iter().map(QuantumNode::num_parameters).sum()
    }

    /// Snapshot of every node's weights.
    pub fn parameters(&self) -> Vec<Vec<f64>> {
        self.nodes.iter().map(|n| n.parameters().to_vec()).collect()
    }

    /// Run every node in order.
    #[instrument(skip_all, fields(nodes = self.nodes.len(), batch = x.nrows()))]
    pub async fn forward(
        &mut self,
        x: &Array2<f64>,
        executor: &dyn CircuitExecutor,
    ) -> NodeResult<Array2<f64>> {
        let last = self.nodes.len() - 1;
        let mut act = x.clone();
        for (k, node) in self.nodes.iter_mut().enumerate() {
            let next = node.forward(&act, executor, k == last).await?;
            act = next;
        }
        Ok(act)
    }

    /// Run every node, recording parameter-shift Jacobians for [`Self::backward`].
    #[instrument(skip_all, fields(nodes = self.nodes.len(), batch = x.nrows()))]
    pub async fn shift_and_run(
        &mut self,
        x: &Array2<f64>,
        executor: &dyn CircuitExecutor,
    ) -> NodeResult<Array2<f64>> {
        let last = self.nodes.len() - 1;
        let mut act = x.clone();
        for (k, node) in self.nodes.iter_mut().enumerate() {
            let next = node.shift_and_run(&act, executor, k == last, k == 0).await?;
            act = next;
        }
        Ok(act)
    }

    /// Back-propagate `∂L/∂(output)`; returns weight gradients per node.
    pub fn backward(&self, grad_out: &Array2<f64>) -> NodeResult<Vec<Vec<f64>>> {
        let mut grads = vec![Vec::new(); self.nodes.len()];
        let mut upstream = grad_out.clone();
        for (k, node) in self.nodes.iter().enumerate().rev() {
            let g = node.backward(&upstream)?;
            grads[k] = g.weights;
            match g.inputs {
                Some(grad_x) => upstream = grad_x,
                None if k == 0 => {}
                None => return Err(NodeError::MissingGradients(node.node_id())),
            }
        }
        Ok(grads)
    }

    /// `w ← w − lr · g` on every node.
    pub fn sgd_step(&mut self, grads: &[Vec<f64>], lr: f64) -> NodeResult<()> {
        if grads.len() != self.nodes.len() {
            return Err(NodeError::ShapeMismatch(format!(
                "{} gradient vectors for {} nodes",
                grads.len(),
                self.nodes.len()
            )));
        }
        for (node, g) in self.nodes.iter_mut().zip(grads) {
            if g.len() != node.num_parameters() {
                return Err(NodeError::ShapeMismatch(format!(
                    "node {} has {} parameters, gradient has {}",
                    node.node_id(),
                    node.num_parameters(),
                    g.len()
                )));
            }
            for (w, dw) in node.parameters_mut().iter_mut().zip(g) {
                *w -= lr * dw;
            }
        }
        Ok(())
    }

    /// Attach the same noise model to every node.
    pub fn set_noise_model(&mut self, noise: Option<ActivationNoise>) {
        if let Some(n) = &noise {
            info!(
                after_norm = n.after_norm,
                factor = n.factor,
                "activation noise enabled"
            );
        }
        for node in &mut self.nodes {
            node.set_noise_model(noise.clone());
        }
    }

    /// Switch every node's noise between train and eval.
    pub fn set_noise_mode(&mut self, mode: NoiseMode) {
        for noise in self.nodes.iter_mut().filter_map(QuantumNode::noise_model_mut) {
            noise.set_mode(mode);
        }
    }

    /// Advance every node's noise schedule.
    pub fn set_epoch(&mut self, epoch: usize) {
        for noise in self.nodes.iter_mut().filter_map(QuantumNode::noise_model_mut) {
            noise.set_epoch(epoch);
        }
    }

    /// Fix the `batch_norm` statistics of node `index`.
    pub fn set_pre_specified_mean_std(
        &mut self,
        index: usize,
        stats: Option<MeanStd>,
    ) -> NodeResult<()> {
        let len = self.nodes.len();
        self.nodes
            .get_mut(index)
            .ok_or_else(|| NodeError::Config(format!("node {index} out of range ({len} nodes)")))?
            .set_pre_specified_mean_std(stats)
    }
}
