use std::fmt::Display;

#[derive(Debug, Clone, PartialEq)]
pub enum GaugeError {
    InvalidConfiguration(String),
    EmptyInput(String),
    Input(String),
    PostProcessor(String),
}

impl Display for GaugeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (err_name, value) = match self {
            GaugeError::InvalidConfiguration(v) => ("Invalid configuration", v),
            GaugeError::EmptyInput(v) => ("Empty input", v),
            GaugeError::Input(v) => ("Input", v),
            GaugeError::PostProcessor(v) => ("Post Processor", v),
        };

        write!(f, "{} error: {}", err_name, value)
    }
}

impl std::error::Error for GaugeError {}
