use heapless::Vec;

use crate::types::{Compatibility, FilePosition, MachineType};

/// Deepest supported block nesting. One frame is consumed per column of
/// indentation, matching how blocks are opened.
pub const MAX_BLOCK_INDENT: usize = 16;

/// One frame of the block stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Plain,
    IfTrue,
    IfFalse,
    /// A `while` whose condition held; remembers where its line starts so the
    /// source can be rewound when the body ends.
    Loop {
        file_position: FilePosition,
        line_number: u32,
    },
}

impl BlockState {
    pub fn is_loop(&self) -> bool {
        matches!(self, BlockState::Loop { .. })
    }

    pub fn is_if_true(&self) -> bool {
        matches!(self, BlockState::IfTrue)
    }

    pub fn is_if_false(&self) -> bool {
        matches!(self, BlockState::IfFalse)
    }
}

/// Positionable handle on the file a channel executes from.
///
/// The host performs the actual reads and feeds the bytes to the parser; the
/// parser only needs to know where the underlying file pointer is, how many
/// fetched bytes are still waiting in the host's read-ahead cache, and how to
/// rewind for loop restarts. `seek` must drop that cache.
pub trait FileInput {
    fn position(&self) -> FilePosition;
    fn bytes_cached(&self) -> u32;
    fn seek(&mut self, position: FilePosition);
}

/// Input type for channels that never execute from a file (serial, USB,
/// network). Uninhabited, so the compiler knows the file paths are dead.
pub enum NoFile {}

impl FileInput for NoFile {
    fn position(&self) -> FilePosition {
        match *self {}
    }

    fn bytes_cached(&self) -> u32 {
        match *self {}
    }

    fn seek(&mut self, _position: FilePosition) {
        match *self {}
    }
}

/// Host-visible execution state of one channel: the last executed line
/// number, the stack of open blocks, and the file being executed if any.
pub struct MachineState<F> {
    pub line_number: u32,
    pub compatibility: Compatibility,
    pub machine_type: MachineType,
    /// `G53` suppresses workplace offsets for the rest of the current line.
    pub g53_active: bool,
    /// Set while running a macro invoked from another file; relaxes the
    /// mandatory-checksum rule on this channel.
    pub in_nested_macro: bool,
    axis_letters: &'static [u8],
    blocks: Vec<BlockState, MAX_BLOCK_INDENT>,
    file: Option<F>,
}

impl<F: FileInput> MachineState<F> {
    pub(crate) fn new() -> Self {
        let mut blocks = Vec::new();
        let _ = blocks.push(BlockState::Plain); // root frame, never popped
        Self {
            line_number: 0,
            compatibility: Compatibility::default(),
            machine_type: MachineType::default(),
            g53_active: false,
            in_nested_macro: false,
            axis_letters: b"XYZ",
            blocks,
            file: None,
        }
    }

    pub fn doing_file(&self) -> bool {
        self.file.is_some()
    }

    pub fn attach_file(&mut self, file: F) {
        self.file = Some(file);
    }

    pub fn detach_file(&mut self) -> Option<F> {
        self.file.take()
    }

    pub fn file(&self) -> Option<&F> {
        self.file.as_ref()
    }

    pub fn file_mut(&mut self) -> Option<&mut F> {
        self.file.as_mut()
    }

    /// Uppercase letters that address an axis on this machine.
    pub fn set_axis_letters(&mut self, letters: &'static [u8]) {
        self.axis_letters = letters;
    }

    pub(crate) fn axis_letters(&self) -> &'static [u8] {
        self.axis_letters
    }

    /// Indent depth of the innermost open block, in columns.
    pub fn indent_level(&self) -> usize {
        self.blocks.len() - 1
    }

    pub(crate) fn current_block(&self) -> BlockState {
        self.blocks.last().copied().unwrap_or(BlockState::Plain)
    }

    pub(crate) fn set_current_block(&mut self, block: BlockState) {
        if let Some(top) = self.blocks.last_mut() {
            *top = block;
        }
    }

    pub(crate) fn create_block(&mut self) -> bool {
        self.blocks.push(BlockState::Plain).is_ok()
    }

    pub(crate) fn end_block(&mut self) {
        if self.blocks.len() > 1 {
            self.blocks.pop();
        }
    }
}
