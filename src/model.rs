use burn::{
    module::Module,
    tensor::{backend::Backend, Int, Tensor, activation},
    nn::{
        BiLstm, BiLstmConfig, Dropout, DropoutConfig, Linear, LinearConfig,
        gru::{Gru, GruConfig},
        loss::CrossEntropyLossConfig,
    },
    config::Config,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Recurrent cell used by every layer of the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CellKind {
    Lstm,
    Gru,
}

impl CellKind {
    pub fn name(&self) -> &'static str {
        match self {
            CellKind::Lstm => "LSTM",
            CellKind::Gru => "GRU",
        }
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bidirectional GRU config
#[derive(Config, Debug)]
pub struct BiGruConfig {
    d_input: usize,
    d_hidden: usize,
    #[config(default = "true")]
    bias: bool,
}

impl BiGruConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> BiGru<B> {
        BiGru {
            gru_forward: GruConfig::new(self.d_input, self.d_hidden, self.bias).init(device),
            gru_backward: GruConfig::new(self.d_input, self.d_hidden, self.bias).init(device),
        }
    }
}

/// Two GRUs over the same sequence, one of them reading it back to front.
///
/// Output at step t is `[forward_t, backward_t]`, matching the layout of
/// burn's `BiLstm` so the two cell kinds stack the same way.
#[derive(Module, Debug)]
pub struct BiGru<B: Backend> {
    gru_forward: Gru<B>,
    gru_backward: Gru<B>,
}

impl<B: Backend> BiGru<B> {
    /// * `x` - [batch_size, seq_len, d_input]
    ///
    /// Returns [batch_size, seq_len, 2 * d_hidden]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let forward = self.gru_forward.forward(x.clone(), None);
        let backward = self.gru_backward.forward(x.flip([1]), None).flip([1]);
        Tensor::cat(vec![forward, backward], 2)
    }
}

/// Character language model config
#[derive(Config, Debug)]
pub struct RecurrentLmConfig {
    cell: CellKind,
    /// Window length the model reads
    maxlen: usize,
    vocab_size: usize,
    /// Units per direction in each recurrent layer
    hidden_size: usize,
    #[config(default = "2")]
    depth: usize,
    #[config(default = "0.2")]
    dropout: f64,
}

impl RecurrentLmConfig {
    pub fn cell(&self) -> CellKind {
        self.cell
    }

    pub fn maxlen(&self) -> usize {
        self.maxlen
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Run name, e.g. `LSTM_40_1_128`
    pub fn name(&self) -> String {
        format!("{}_{}_{}_{}", self.cell, self.maxlen, self.depth, self.hidden_size)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> RecurrentLm<B> {
        let mut lstm_layers = Vec::new();
        let mut gru_layers = Vec::new();

        for i in 0..self.depth {
            let d_input = if i == 0 { self.vocab_size } else { 2 * self.hidden_size };
            match self.cell {
                CellKind::Lstm => {
                    lstm_layers.push(BiLstmConfig::new(d_input, self.hidden_size, true).init(device));
                }
                CellKind::Gru => {
                    gru_layers.push(BiGruConfig::new(d_input, self.hidden_size).init(device));
                }
            }
        }

        // Recurrent outputs of every step are flattened into the dense layer
        let d_flat = self.maxlen * 2 * self.hidden_size;

        RecurrentLm {
            lstm_layers,
            gru_layers,
            dropout: DropoutConfig::new(self.dropout).init(),
            output: LinearConfig::new(d_flat, self.vocab_size).init(device),
            maxlen: self.maxlen,
        }
    }
}

/// Stacked bidirectional recurrent network with a dense softmax head.
///
/// Only one of the layer stacks is populated, depending on the cell kind.
#[derive(Module, Debug)]
pub struct RecurrentLm<B: Backend> {
    lstm_layers: Vec<BiLstm<B>>,
    gru_layers: Vec<BiGru<B>>,
    dropout: Dropout,
    output: Linear<B>,
    #[module(skip)]
    maxlen: usize,
}

impl<B: Backend> RecurrentLm<B> {
    /// Forward pass of the model
    ///
    /// # Arguments
    ///
    /// * `x` - One-hot windows [batch_size, maxlen, vocab_size]
    ///
    /// # Returns
    ///
    /// * `logits` - Next-character logits [batch_size, vocab_size]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        let mut x = x;
        for layer in &self.lstm_layers {
            let (output, _) = layer.forward(x, None);
            x = output;
        }
        for layer in &self.gru_layers {
            x = layer.forward(x);
        }

        let x = x.flatten::<2>(1, 2);
        let x = self.dropout.forward(x);
        self.output.forward(x)
    }

    /// Next-character distribution for each window [batch_size, vocab_size]
    pub fn probabilities(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        activation::softmax(self.forward(x), 1)
    }

    /// Mean categorical cross-entropy against the successor class indices
    pub fn loss(&self, x: Tensor<B, 3>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let logits = self.forward(x);
        let loss_fn = CrossEntropyLossConfig::new().init(&logits.device());
        loss_fn.forward(logits, targets)
    }

    pub fn depth(&self) -> usize {
        self.lstm_layers.len() + self.gru_layers.len()
    }

    pub fn vocab_size(&self) -> usize {
        self.output.weight.dims()[1]
    }

    /// Window length the model was built for
    pub fn maxlen(&self) -> usize {
        self.maxlen
    }

    pub fn device(&self) -> B::Device {
        self.output.weight.device()
    }
}
