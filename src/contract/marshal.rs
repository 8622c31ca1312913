//! Converts between native argument slots and wire params using a method descriptor.

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::contract::converter::ValueConverter;
use crate::contract::descriptor::{MethodDescriptor, ParameterContract};
use crate::contract::value::{Arg, Arguments, NativeValue};
use crate::errors::{ConversionError, InvalidRequest, MarshalError};
use crate::features::FeatureCollection;
use crate::rpc::message::{RequestId, RequestMessage};

pub struct Marshaler<'a> {
    descriptor: &'a MethodDescriptor,
}

impl<'a> Marshaler<'a> {
    pub fn new(descriptor: &'a MethodDescriptor) -> Self {
        Self { descriptor }
    }

    /// Builds a request from native arguments given in parameter order.
    ///
    /// Omitted trailing optionals and ambient slots never appear in the params object.
    pub fn marshal(&self, args: &[Arg], id: Option<RequestId>) -> Result<RequestMessage, MarshalError> {
        let parameters = &self.descriptor.parameters;
        if args.len() > parameters.len() {
            return Err(InvalidRequest::TooManyArguments {
                method: self.descriptor.name.clone(),
                expected: parameters.len(),
                supplied: args.len(),
            }
            .into());
        }

        let mut params = Map::new();
        for (index, contract) in parameters.iter().enumerate() {
            match (args.get(index), contract.is_ambient()) {
                (None | Some(Arg::Missing | Arg::Cancellation(_)), true) => {}
                (None | Some(Arg::Missing), false) if contract.optional => {}
                (None | Some(Arg::Missing), false) => {
                    return Err(InvalidRequest::MissingParameter {
                        parameter: contract.name.clone(),
                        method: self.descriptor.name.clone(),
                    }
                    .into());
                }
                (Some(Arg::Value(value)), false) => {
                    params.insert(contract.name.clone(), self.to_wire(contract, value)?);
                }
                (Some(Arg::Value(_)), true) | (Some(Arg::Cancellation(_)), false) => {
                    return Err(self.kind_mismatch(contract).into());
                }
            }
        }

        Ok(RequestMessage::new(self.descriptor.name.clone(), params, id))
    }

    /// Aligns wire params to parameter order and converts each value.
    ///
    /// Ambient slots come from `features`; omitted optionals become [`Arg::Missing`].
    pub fn unmarshal(
        &self,
        request: &RequestMessage,
        features: &FeatureCollection,
    ) -> Result<Arguments, MarshalError> {
        let empty = Map::new();
        let params = match &request.params {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(params)) => params,
            Some(_) => {
                return Err(InvalidRequest::MalformedParams {
                    method: self.descriptor.name.clone(),
                    reason: "params must be an object".to_string(),
                }
                .into())
            }
        };

        let mut slots = Vec::with_capacity(self.descriptor.parameters.len());
        for contract in &self.descriptor.parameters {
            slots.push(self.unmarshal_slot(contract, params, features)?);
        }

        let extension_data = self.descriptor.extension_data.then(|| {
            params
                .iter()
                .filter(|(key, _)| self.descriptor.parameter(key).is_none())
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        });

        Ok(Arguments::new(
            self.descriptor.name.clone(),
            self.descriptor.parameter_names(),
            slots,
            extension_data,
        ))
    }

    pub fn marshal_result(&self, value: &NativeValue) -> Result<Value, MarshalError> {
        self.descriptor
            .returns
            .converter
            .to_json(value)
            .map_err(|err| err.in_result(&self.descriptor.name).into())
    }

    pub fn unmarshal_result(&self, value: &Value) -> Result<NativeValue, MarshalError> {
        let returns = &self.descriptor.returns;
        returns
            .converter
            .from_json(value, &returns.type_tag)
            .map_err(|err| err.in_result(&self.descriptor.name).into())
    }

    fn unmarshal_slot(
        &self,
        contract: &ParameterContract,
        params: &Map<String, Value>,
        features: &FeatureCollection,
    ) -> Result<Arg, MarshalError> {
        if contract.is_ambient() {
            let token = features
                .cancellation()
                .cloned()
                .unwrap_or_else(CancellationToken::new);
            return Ok(Arg::Cancellation(token));
        }

        match params.get(&contract.name) {
            Some(value) => {
                let converter = self.converter(contract)?;
                converter
                    .from_json(value, &contract.type_tag)
                    .map(Arg::Value)
                    .map_err(|err| err.in_parameter(&contract.name, &self.descriptor.name).into())
            }
            None if contract.optional => Ok(Arg::Missing),
            None => Err(InvalidRequest::MissingParameter {
                parameter: contract.name.clone(),
                method: self.descriptor.name.clone(),
            }
            .into()),
        }
    }

    fn to_wire(&self, contract: &ParameterContract, value: &NativeValue) -> Result<Value, MarshalError> {
        self.converter(contract)?
            .to_json(value)
            .map_err(|err| err.in_parameter(&contract.name, &self.descriptor.name).into())
    }

    fn converter<'c>(
        &self,
        contract: &'c ParameterContract,
    ) -> Result<&'c dyn ValueConverter, MarshalError> {
        contract.converter.as_deref().ok_or_else(|| {
            ConversionError::new(&contract.type_tag, Value::Null)
                .in_parameter(&contract.name, &self.descriptor.name)
                .into()
        })
    }

    fn kind_mismatch(&self, contract: &ParameterContract) -> InvalidRequest {
        InvalidRequest::ArgumentKindMismatch {
            parameter: contract.name.clone(),
            method: self.descriptor.name.clone(),
        }
    }
}
