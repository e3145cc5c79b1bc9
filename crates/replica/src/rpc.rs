use std::collections::HashMap;

use crate::buffer::{NetBuffer, NetReader};
use crate::error::{BufferError, RpcError};
use crate::protocol::PacketKind;
use crate::transport::Role;
use crate::value::Color;

const TAG_INT: u8 = 0x01;
const TAG_FLOAT: u8 = 0x02;
const TAG_BOOL: u8 = 0x03;
const TAG_STRING: u8 = 0x04;
const TAG_COLOR: u8 = 0x05;

/// One RPC argument. The wire form is a one-byte tag followed by the value.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcValue {
    Int(i32),
    Float(f32),
    Bool(bool),
    Str(String),
    Color(Color),
}

impl RpcValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            RpcValue::Int(_) => "int",
            RpcValue::Float(_) => "float",
            RpcValue::Bool(_) => "bool",
            RpcValue::Str(_) => "string",
            RpcValue::Color(_) => "color",
        }
    }

    pub fn write(&self, buf: &mut NetBuffer) -> Result<(), BufferError> {
        match self {
            RpcValue::Int(v) => {
                buf.write_u8(TAG_INT)?;
                buf.write_i32(*v)
            }
            RpcValue::Float(v) => {
                buf.write_u8(TAG_FLOAT)?;
                buf.write_f32(*v)
            }
            RpcValue::Bool(v) => {
                buf.write_u8(TAG_BOOL)?;
                buf.write_bool(*v)
            }
            RpcValue::Str(v) => {
                buf.write_u8(TAG_STRING)?;
                buf.write_string(v)
            }
            RpcValue::Color(v) => {
                buf.write_u8(TAG_COLOR)?;
                buf.write_i32(v.to_rgba8888())
            }
        }
    }

    pub fn read(reader: &mut NetReader<'_>) -> Result<Self, BufferError> {
        match reader.read_u8()? {
            TAG_INT => Ok(RpcValue::Int(reader.read_i32()?)),
            TAG_FLOAT => Ok(RpcValue::Float(reader.read_f32()?)),
            TAG_BOOL => Ok(RpcValue::Bool(reader.read_bool()?)),
            TAG_STRING => Ok(RpcValue::Str(reader.read_string()?)),
            TAG_COLOR => Ok(RpcValue::Color(Color::from_rgba8888(reader.read_i32()?))),
            tag => Err(BufferError::UnknownTag(tag)),
        }
    }
}

impl From<i32> for RpcValue {
    fn from(v: i32) -> Self {
        RpcValue::Int(v)
    }
}

impl From<f32> for RpcValue {
    fn from(v: f32) -> Self {
        RpcValue::Float(v)
    }
}

impl From<bool> for RpcValue {
    fn from(v: bool) -> Self {
        RpcValue::Bool(v)
    }
}

impl From<String> for RpcValue {
    fn from(v: String) -> Self {
        RpcValue::Str(v)
    }
}

impl From<&str> for RpcValue {
    fn from(v: &str) -> Self {
        RpcValue::Str(v.to_owned())
    }
}

impl From<Color> for RpcValue {
    fn from(v: Color) -> Self {
        RpcValue::Color(v)
    }
}

/// Positional cursor over decoded arguments, handed to RPC handlers.
#[derive(Debug, Clone, Default)]
pub struct RpcArgs {
    values: Vec<RpcValue>,
    cursor: usize,
}

impl RpcArgs {
    pub fn new(values: Vec<RpcValue>) -> Self {
        Self { values, cursor: 0 }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[RpcValue] {
        &self.values
    }

    fn next(&mut self, expected: &'static str) -> Result<(usize, &RpcValue), RpcError> {
        let index = self.cursor;
        let value = self
            .values
            .get(index)
            .ok_or(RpcError::MissingArgument { index, expected })?;
        self.cursor += 1;
        Ok((index, value))
    }

    pub fn int(&mut self) -> Result<i32, RpcError> {
        match self.next("int")? {
            (_, RpcValue::Int(v)) => Ok(*v),
            (index, other) => Err(mismatch(index, "int", other)),
        }
    }

    pub fn float(&mut self) -> Result<f32, RpcError> {
        match self.next("float")? {
            (_, RpcValue::Float(v)) => Ok(*v),
            (index, other) => Err(mismatch(index, "float", other)),
        }
    }

    pub fn boolean(&mut self) -> Result<bool, RpcError> {
        match self.next("bool")? {
            (_, RpcValue::Bool(v)) => Ok(*v),
            (index, other) => Err(mismatch(index, "bool", other)),
        }
    }

    pub fn string(&mut self) -> Result<String, RpcError> {
        match self.next("string")? {
            (_, RpcValue::Str(v)) => Ok(v.clone()),
            (index, other) => Err(mismatch(index, "string", other)),
        }
    }

    pub fn color(&mut self) -> Result<Color, RpcError> {
        match self.next("color")? {
            (_, RpcValue::Color(v)) => Ok(*v),
            (index, other) => Err(mismatch(index, "color", other)),
        }
    }
}

fn mismatch(index: usize, expected: &'static str, found: &RpcValue) -> RpcError {
    RpcError::ArgumentMismatch {
        index,
        expected,
        found: found.type_name(),
    }
}

/// Which side an RPC executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcKind {
    /// Sent by a client, executed on the server.
    Server,
    /// Sent by the server, executed on clients.
    Client,
}

impl RpcKind {
    pub fn runs_on(self) -> Role {
        match self {
            RpcKind::Server => Role::Server,
            RpcKind::Client => Role::Client,
        }
    }

    pub fn packet_kind(self) -> PacketKind {
        match self {
            RpcKind::Server => PacketKind::ServerRpc,
            RpcKind::Client => PacketKind::ClientRpc,
        }
    }
}

pub type RpcHandler<B> = fn(&mut B, &mut RpcArgs) -> Result<(), RpcError>;

struct RpcEntry<B> {
    kind: RpcKind,
    handler: RpcHandler<B>,
}

/// Method table for one behaviour type, keyed by method name.
///
/// Build it once per type (a `static OnceLock` works well) and forward
/// `NetworkBehaviour::handle_rpc` to `dispatch`.
pub struct RpcRegistry<B> {
    methods: HashMap<&'static str, RpcEntry<B>>,
}

impl<B> Default for RpcRegistry<B> {
    fn default() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }
}

impl<B> RpcRegistry<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server_rpc(self, name: &'static str, handler: RpcHandler<B>) -> Self {
        self.register(name, RpcKind::Server, handler)
    }

    pub fn client_rpc(self, name: &'static str, handler: RpcHandler<B>) -> Self {
        self.register(name, RpcKind::Client, handler)
    }

    fn register(mut self, name: &'static str, kind: RpcKind, handler: RpcHandler<B>) -> Self {
        if self.methods.insert(name, RpcEntry { kind, handler }).is_some() {
            log::warn!("rpc `{}` registered twice, keeping the later handler", name);
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn kind(&self, name: &str) -> Option<RpcKind> {
        self.methods.get(name).map(|entry| entry.kind)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Runs `method` on `target` if it exists and is allowed to execute on `received_on`.
    pub fn dispatch(
        &self,
        target: &mut B,
        method: &str,
        args: &mut RpcArgs,
        received_on: Role,
    ) -> Result<(), RpcError> {
        let entry = self
            .methods
            .get(method)
            .ok_or_else(|| RpcError::UnknownMethod(method.to_owned()))?;
        if entry.kind.runs_on() != received_on {
            return Err(RpcError::WrongSide {
                method: method.to_owned(),
                role: received_on,
            });
        }
        (entry.handler)(target, args)
    }
}
