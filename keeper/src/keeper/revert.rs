use std::fmt;

use derive_new::new;
use ethers::abi::{self, ParamType, Token};
use ethers::types::{Bytes, I256};
use ethers::utils::{id, to_checksum};


/// `Error(string)`
const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
/// `Panic(uint256)`
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

const UNKNOWN: &str = "unknown";
const WRAPPED_ERROR: &str = "WrappedError";

/// A custom solidity error the keeper knows how to decode.
#[derive(Debug, Clone, PartialEq)]
pub struct KnownError {
    pub name: String,
    pub inputs: Vec<ParamType>,
}

impl KnownError {
    pub fn new(name: &str, inputs: Vec<ParamType>) -> Self {
        Self {
            name: name.to_owned(),
            inputs,
        }
    }

    pub fn signature(&self) -> String {
        let inputs = self
            .inputs
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        format!("{}({})", self.name, inputs)
    }

    pub fn selector(&self) -> [u8; 4] {
        id(self.signature())
    }

    /// ABI encoded revert data for this error.
    pub fn encode(&self, args: &[Token]) -> Bytes {
        let mut data = self.selector().to_vec();
        data.extend(abi::encode(args));
        data.into()
    }
}

/// Custom errors that may be raised by a call target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorRegistry {
    errors: Vec<KnownError>,
}

impl ErrorRegistry {
    pub fn new(errors: Vec<KnownError>) -> Self {
        Self { errors }
    }

    pub fn find(&self, selector: &[u8]) -> Option<&KnownError> {
        self.errors
            .iter()
            .find(|error| error.selector().as_slice() == selector)
    }

    pub fn get(&self, name: &str) -> Option<&KnownError> {
        self.errors.iter().find(|error| error.name == name)
    }
}

/// Grouping key for reported failures.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Fingerprint {
    pub kind: String,
    pub reason: String,
    pub argument: Option<String>,
}

/// A decoded revert payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Revert {
    /// Error name, the hex selector when unknown, or `unknown` without data.
    pub name: String,
    pub args: Vec<Token>,
    pub decoded: bool,
    pub data: Bytes,
}

impl Revert {
    pub fn decode(data: &[u8], registry: &ErrorRegistry) -> Self {
        let Some((selector, payload)) = data.split_first_chunk::<4>() else {
            return Self {
                name: UNKNOWN.to_owned(),
                args: vec![],
                decoded: false,
                data: data.to_vec().into(),
            };
        };
        let (name, inputs) = match *selector {
            ERROR_SELECTOR => ("Error".to_owned(), vec![ParamType::String]),
            PANIC_SELECTOR => ("Panic".to_owned(), vec![ParamType::Uint(256)]),
            _ => match registry.find(selector) {
                Some(error) => (error.name.clone(), error.inputs.clone()),
                None => return Self::undecoded(selector, data),
            },
        };
        match abi::decode(&inputs, payload) {
            Ok(args) => Self {
                name,
                args,
                decoded: true,
                data: data.to_vec().into(),
            },
            Err(_) => Self::undecoded(selector, data),
        }
    }

    fn undecoded(selector: &[u8; 4], data: &[u8]) -> Self {
        Self {
            name: format!("0x{}", hex::encode(selector)),
            args: vec![],
            decoded: false,
            data: data.to_vec().into(),
        }
    }

    /// `Name(arg,...)` for decoded errors, the bare name otherwise.
    pub fn reason(&self) -> String {
        if !self.decoded {
            return self.name.clone();
        }
        let args = self.args.iter().map(format_token).collect::<Vec<_>>();
        format!("{}({})", self.name, args.join(","))
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let argument = match (self.name.as_str(), self.args.get(1)) {
            (WRAPPED_ERROR, Some(selector)) => Some(format_token(selector)),
            _ => None,
        };
        Fingerprint::new("revert".to_owned(), self.name.clone(), argument)
    }

    pub fn is(&self, name: &str) -> bool {
        self.decoded && self.name == name
    }
}

impl fmt::Display for Revert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason())
    }
}

/// Formats a token the way it appears in reasons and span attributes.
pub fn format_token(token: &Token) -> String {
    match token {
        Token::Address(address) => to_checksum(address, None),
        Token::Uint(value) => value.to_string(),
        Token::Int(value) => I256::from_raw(*value).to_string(),
        Token::Bool(value) => value.to_string(),
        Token::String(value) => value.clone(),
        Token::Bytes(bytes) | Token::FixedBytes(bytes) => format!("0x{}", hex::encode(bytes)),
        Token::Array(tokens) | Token::FixedArray(tokens) => tokens
            .iter()
            .map(format_token)
            .collect::<Vec<_>>()
            .join(","),
        Token::Tuple(tokens) => format!(
            "({})",
            tokens
                .iter()
                .map(format_token)
                .collect::<Vec<_>>()
                .join(",")
        ),
    }
}
