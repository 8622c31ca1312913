//! Method contracts: type tags, converters, descriptors and argument marshaling.

pub mod converter;
pub mod descriptor;
pub mod marshal;
pub mod value;

pub use converter::{ConverterRegistry, ValueConverter};
pub use descriptor::{Invoker, MethodDescriptor, ParameterContract, ReturnContract, ServiceInstance};
pub use marshal::Marshaler;
pub use value::{Arg, Arguments, FromNative, NativeValue, TypeTag};
