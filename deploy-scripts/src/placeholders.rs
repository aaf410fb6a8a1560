//! The placeholder resolver: expands symbolic constructor / initializer
//! argument tokens into concrete values, recursing into the orchestrator
//! for sibling-contract references

use std::str::FromStr;

use deploy_common::{
    constants::{role_hash, TENANT_NAME_ARG},
    types::{ArgValue, ConstructorArg},
};
use ethers::{
    abi::{Param, ParamType, Token},
    types::{Address, U256},
};
use serde_json::Value;

use crate::{
    chain::ChainClient,
    constants::INITIALIZER_FUNCTION_NAME,
    errors::ScriptError,
    orchestrator::{BoxFuture, Orchestrator},
};

/// A fully-resolved argument value, not yet shaped to an ABI parameter type
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedValue {
    /// A literal manifest value, shaped to the parameter type at
    /// tokenization
    Literal(Value),
    /// A resolved address (deployer wallet, null sentinel, or sibling
    /// contract)
    Address(Address),
    /// A 32-byte constant (role hashes)
    Hash([u8; 32]),
    /// Raw call-data bytes (encoded initializers)
    Bytes(Vec<u8>),
}

impl<C: ChainClient> Orchestrator<C> {
    /// Resolves a list of named constructor arguments in order
    pub(crate) async fn resolve_args(
        &self,
        tenant: &str,
        args: &[ConstructorArg],
    ) -> Result<Vec<ResolvedValue>, ScriptError> {
        let mut resolved = Vec::with_capacity(args.len());
        for arg in args {
            resolved.push(self.resolve_value(tenant, &arg.value).await?);
        }
        Ok(resolved)
    }

    /// Resolves a list of unnamed argument values in order
    pub(crate) async fn resolve_values(
        &self,
        tenant: &str,
        values: &[ArgValue],
    ) -> Result<Vec<ResolvedValue>, ScriptError> {
        let mut resolved = Vec::with_capacity(values.len());
        for value in values {
            resolved.push(self.resolve_value(tenant, value).await?);
        }
        Ok(resolved)
    }

    /// Resolves one argument value.
    ///
    /// Boxed because sibling-contract references recurse into deployment,
    /// which resolves that contract's arguments in turn.
    pub(crate) fn resolve_value<'a>(
        &'a self,
        tenant: &'a str,
        value: &'a ArgValue,
    ) -> BoxFuture<'a, Result<ResolvedValue, ScriptError>> {
        Box::pin(async move {
            match value {
                ArgValue::Literal(raw) => Ok(ResolvedValue::Literal(raw.clone())),
                ArgValue::DeployerWallet => {
                    Ok(ResolvedValue::Address(self.client.deployer_address()))
                }
                ArgValue::ZeroAddress => Ok(ResolvedValue::Address(Address::zero())),
                ArgValue::RoleConstant(name) => Ok(ResolvedValue::Hash(role_hash(name))),
                ArgValue::ContractRef(name) => {
                    // A reference to a contract the manifest does not know
                    // is a placeholder that cannot resolve, not a
                    // dependency-list error
                    self.registry.get(name).map_err(|_| {
                        ScriptError::UnresolvedPlaceholder(format!("CONTRACT_{name}"))
                    })?;
                    let (record, _) = self.ensure_deployed(name, tenant).await?;
                    Ok(ResolvedValue::Address(record.contract_address))
                }
                ArgValue::EncodedInitializer(name) => {
                    self.encode_initializer(tenant, name).await
                }
            }
        })
    }

    /// Produces ABI-encoded initializer call-data for the named
    /// implementation contract.
    ///
    /// The implementation must already be deployed: its persisted record
    /// supplies the initializer's ABI, and the orchestrator's dependency
    /// ordering is what upholds that invariant.
    async fn encode_initializer(
        &self,
        tenant: &str,
        name: &str,
    ) -> Result<ResolvedValue, ScriptError> {
        let target = self.registry.get(name).map_err(|_| {
            ScriptError::UnresolvedPlaceholder(format!("ENCODE_INITIALIZE_FUNCTION_{name}"))
        })?;
        let record = self
            .records
            .read_latest(&target.contract_type, tenant)
            .map_err(|_| ScriptError::MissingImplementationContract(name.to_string()))?;

        let mut values = self.resolve_args(tenant, &target.constructor_args).await?;
        apply_tenant_prefix(&target.constructor_args, &mut values, tenant);

        let function = record
            .abi
            .function(INITIALIZER_FUNCTION_NAME)
            .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))?;
        let tokens = tokenize_args(&function.inputs, &values)?;
        let data = function
            .encode_input(&tokens)
            .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))?;

        Ok(ResolvedValue::Bytes(data))
    }
}

/// Prefixes the designated `name` argument with the tenant identifier,
/// namespacing per-tenant token names
pub(crate) fn apply_tenant_prefix(
    args: &[ConstructorArg],
    values: &mut [ResolvedValue],
    tenant: &str,
) {
    for (arg, value) in args.iter().zip(values.iter_mut()) {
        if arg.name == TENANT_NAME_ARG {
            if let ResolvedValue::Literal(Value::String(name)) = value {
                *value = ResolvedValue::Literal(Value::String(format!("{tenant} {name}")));
            }
        }
    }
}

/// Shapes resolved values to the target function or constructor's ABI
/// parameter types.
///
/// Arity or type mismatches are calldata-construction errors, surfaced
/// before any chain interaction.
pub(crate) fn tokenize_args(
    params: &[Param],
    values: &[ResolvedValue],
) -> Result<Vec<Token>, ScriptError> {
    if params.len() != values.len() {
        return Err(ScriptError::CalldataConstruction(format!(
            "expected {} arguments, got {}",
            params.len(),
            values.len()
        )));
    }

    params
        .iter()
        .zip(values.iter())
        .map(|(param, value)| tokenize_value(param, value))
        .collect()
}

/// Shapes one resolved value to one ABI parameter type
fn tokenize_value(param: &Param, value: &ResolvedValue) -> Result<Token, ScriptError> {
    let mismatch = || {
        ScriptError::CalldataConstruction(format!(
            "argument {} does not fit ABI type {}",
            param.name, param.kind
        ))
    };

    match (&param.kind, value) {
        (ParamType::Address, ResolvedValue::Address(address)) => Ok(Token::Address(*address)),
        (ParamType::Address, ResolvedValue::Literal(Value::String(s))) => {
            Address::from_str(s).map(Token::Address).map_err(|_| mismatch())
        }
        (ParamType::FixedBytes(32), ResolvedValue::Hash(hash)) => {
            Ok(Token::FixedBytes(hash.to_vec()))
        }
        (ParamType::FixedBytes(len), ResolvedValue::Literal(Value::String(s))) => {
            let bytes = decode_hex(s).ok_or_else(mismatch)?;
            if bytes.len() == *len {
                Ok(Token::FixedBytes(bytes))
            } else {
                Err(mismatch())
            }
        }
        (ParamType::Bytes, ResolvedValue::Bytes(bytes)) => Ok(Token::Bytes(bytes.clone())),
        (ParamType::Bytes, ResolvedValue::Literal(Value::String(s))) => {
            decode_hex(s).map(Token::Bytes).ok_or_else(mismatch)
        }
        (ParamType::String, ResolvedValue::Literal(Value::String(s))) => {
            Ok(Token::String(s.clone()))
        }
        (ParamType::Uint(_), ResolvedValue::Literal(raw)) => {
            parse_uint(raw).map(Token::Uint).ok_or_else(mismatch)
        }
        (ParamType::Int(_), ResolvedValue::Literal(raw)) => {
            parse_uint(raw).map(Token::Int).ok_or_else(mismatch)
        }
        (ParamType::Bool, ResolvedValue::Literal(Value::Bool(b))) => Ok(Token::Bool(*b)),
        _ => Err(mismatch()),
    }
}

/// Decodes a `0x`-prefixed or bare hex string
fn decode_hex(s: &str) -> Option<Vec<u8>> {
    hex::decode(s.trim_start_matches("0x")).ok()
}

/// Parses a non-negative integer literal from a JSON number, a decimal
/// string, or a `0x`-prefixed hex string
fn parse_uint(raw: &Value) -> Option<U256> {
    match raw {
        Value::Number(n) => n.as_u64().map(U256::from),
        Value::String(s) => {
            if let Some(hex_digits) = s.strip_prefix("0x") {
                U256::from_str_radix(hex_digits, 16).ok()
            } else {
                U256::from_dec_str(s).ok()
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use ethers::{
        abi::{Param, ParamType, Token},
        types::{Address, U256},
    };
    use serde_json::json;

    use super::{tokenize_args, ResolvedValue};

    /// An unnamed ABI parameter of the given type
    fn param(kind: ParamType) -> Param {
        Param {
            name: "arg".to_string(),
            kind,
            internal_type: None,
        }
    }

    #[test]
    fn test_scalar_conversions() {
        let params = vec![
            param(ParamType::Address),
            param(ParamType::Uint(256)),
            param(ParamType::Uint(256)),
            param(ParamType::Bool),
            param(ParamType::String),
        ];
        let address = Address::from_low_u64_be(7);
        let values = vec![
            ResolvedValue::Address(address),
            ResolvedValue::Literal(json!(1000)),
            ResolvedValue::Literal(json!("1000000000000000000000")),
            ResolvedValue::Literal(json!(true)),
            ResolvedValue::Literal(json!("Gold")),
        ];

        let tokens = tokenize_args(&params, &values).unwrap();
        assert_eq!(tokens[0], Token::Address(address));
        assert_eq!(tokens[1], Token::Uint(U256::from(1000u64)));
        assert_eq!(
            tokens[2],
            Token::Uint(U256::from_dec_str("1000000000000000000000").unwrap())
        );
        assert_eq!(tokens[3], Token::Bool(true));
        assert_eq!(tokens[4], Token::String("Gold".to_string()));
    }

    #[test]
    fn test_role_hash_fits_bytes32() {
        let params = vec![param(ParamType::FixedBytes(32))];
        let values = vec![ResolvedValue::Hash([7u8; 32])];
        let tokens = tokenize_args(&params, &values).unwrap();
        assert_eq!(tokens[0], Token::FixedBytes(vec![7u8; 32]));
    }

    #[test]
    fn test_arity_mismatch_is_fatal() {
        let params = vec![param(ParamType::Address)];
        assert!(tokenize_args(&params, &[]).is_err());
    }

    #[test]
    fn test_type_mismatch_is_fatal() {
        let params = vec![param(ParamType::Bool)];
        let values = vec![ResolvedValue::Literal(json!("not a bool"))];
        assert!(tokenize_args(&params, &values).is_err());
    }
}
