use ethers::abi::{Function, Token};
use ethers::types::{Address, Bytes};

use crate::error::KeeperError;

use super::revert::{format_token, ErrorRegistry};

/// A contract function invocation the keeper should send.
#[derive(Debug, Clone)]
pub struct ContractCall {
    pub address: Address,
    pub function: Function,
    pub args: Vec<Token>,
    /// Custom errors the target may revert with.
    pub errors: ErrorRegistry,
}

impl ContractCall {
    pub fn new(address: Address, function: Function, args: Vec<Token>) -> Self {
        Self {
            address,
            function,
            args,
            errors: ErrorRegistry::default(),
        }
    }

    pub fn with_errors(mut self, errors: ErrorRegistry) -> Self {
        self.errors = errors;
        self
    }

    pub fn calldata(&self) -> Result<Bytes, KeeperError> {
        self.function
            .encode_input(&self.args)
            .map(Bytes::from)
            .map_err(|err| KeeperError::Encoding {
                function: self.function.name.clone(),
                reason: err.to_string(),
            })
    }

    /// `name(arg, ...)`, as recorded on spans and reports.
    pub fn describe(&self) -> String {
        let args = self.args.iter().map(format_token).collect::<Vec<_>>();
        format!("{}({})", self.function.name, args.join(", "))
    }
}
