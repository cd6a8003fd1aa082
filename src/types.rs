use core::net::Ipv4Addr;

/// Byte offset into the file a channel is executing from.
pub type FilePosition = u32;

/// Identifies one stepper driver, either on the main board or on an expansion
/// board reachable over the bus. Written `B.D` in G-code, or just `D` for a
/// main-board driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverId {
    pub board_address: u32,
    pub local_driver: u32,
}

impl DriverId {
    pub fn new(board_address: u32, local_driver: u32) -> Self {
        Self {
            board_address,
            local_driver,
        }
    }

    pub fn is_local(&self) -> bool {
        self.board_address == 0
    }
}

/// Typed result of resolving a `{...}` expression against the object model.
///
/// `Float2` and `Float3` are floats that render with two and three decimals
/// when converted to a string; everywhere else they behave like `Float`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExpressionValue {
    Float(f32),
    Float2(f32),
    Float3(f32),
    Int(i32),
    Uint(u32),
    Bool(bool),
    Str(&'static str),
    Ip(Ipv4Addr),
}

impl From<f32> for ExpressionValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<i32> for ExpressionValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for ExpressionValue {
    fn from(v: u32) -> Self {
        Self::Uint(v)
    }
}

impl From<bool> for ExpressionValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&'static str> for ExpressionValue {
    fn from(v: &'static str) -> Self {
        Self::Str(v)
    }
}

impl From<Ipv4Addr> for ExpressionValue {
    fn from(v: Ipv4Addr) -> Self {
        Self::Ip(v)
    }
}

/// Reply dialect expected by the host talking to this channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compatibility {
    #[default]
    Native,
    Marlin,
}

/// Kind of machine the firmware is driving. Only `Cnc` enables the
/// bare-axis-word command continuation shortcut.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MachineType {
    #[default]
    Fff,
    Cnc,
    Laser,
}
