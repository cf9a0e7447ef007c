//! In-memory programs and a small builder with label resolution

use std::collections::BTreeMap;

use crate::error::{SimulatorError, SimulatorResult};
use crate::instruction::{Function, Instruction};

/// Instructions laid out back to back from `base`, plus initial data
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    pub base: u32,
    pub instructions: Vec<Instruction>,
    /// Label addresses
    pub labels: BTreeMap<String, u32>,
    /// Initial data memory contents as `(address, bytes)`
    pub data: Vec<(u32, Vec<u8>)>,
    pub entry: u32,
}

impl Program {
    /// Decodes raw instruction words placed from `base`
    pub fn from_words(base: u32, words: &[u32]) -> SimulatorResult<Self> {
        Ok(Self {
            base,
            instructions: words.iter().map(|&raw| Instruction::new(raw)).collect::<Result<_, _>>()?,
            labels: BTreeMap::new(),
            data: Vec::new(),
            entry: base,
        })
    }

    pub fn end(&self) -> u32 {
        self.instructions
            .iter()
            .fold(self.base, |address, inst| address.wrapping_add(inst.length()))
    }
}

#[derive(Clone, Debug)]
enum Item {
    Fixed { function: Function, rd: u32, rs1: u32, rs2: u32, imm: i32 },
    /// Conditional branch to a label
    Branch { function: Function, rs1: u32, rs2: u32, label: String },
    /// `jal` to a label
    Jump { rd: u32, label: String },
}

/// Assembles a [`Program`] from instruction fields.
///
/// With padding enabled, every instruction is followed by that many NOPs
/// so a program can run without hazard detection. Labels and branch
/// offsets account for the padding.
#[derive(Clone, Debug, Default)]
pub struct ProgramBuilder {
    base: u32,
    items: Vec<Item>,
    labels: BTreeMap<String, usize>,
    data: Vec<(u32, Vec<u8>)>,
    entry: Option<String>,
    padding: u32,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places the program at `base` instead of 0
    pub fn base(&mut self, base: u32) -> &mut Self {
        self.base = base;
        self
    }

    /// NOPs inserted after every instruction
    pub fn padding(&mut self, nops: u32) -> &mut Self {
        self.padding = nops;
        self
    }

    /// Names the next instruction
    pub fn label(&mut self, name: &str) -> &mut Self {
        self.labels.insert(name.to_string(), self.items.len());
        self
    }

    /// Starts execution at a label instead of the first instruction
    pub fn entry(&mut self, label: &str) -> &mut Self {
        self.entry = Some(label.to_string());
        self
    }

    /// Any instruction, operands as in [`crate::instruction::encode::encode`]
    pub fn push(&mut self, function: Function, rd: u32, rs1: u32, rs2: u32, imm: i32) -> &mut Self {
        self.items.push(Item::Fixed { function, rd, rs1, rs2, imm });
        self
    }

    pub fn nop(&mut self) -> &mut Self {
        self.push(Function::ADDI, 0, 0, 0, 0)
    }

    pub fn branch(&mut self, function: Function, rs1: u32, rs2: u32, label: &str) -> &mut Self {
        self.items.push(Item::Branch { function, rs1, rs2, label: label.to_string() });
        self
    }

    pub fn jal(&mut self, rd: u32, label: &str) -> &mut Self {
        self.items.push(Item::Jump { rd, label: label.to_string() });
        self
    }

    /// Little-endian words at `address`
    pub fn data_words(&mut self, address: u32, words: &[u32]) -> &mut Self {
        let bytes = words.iter().flat_map(|word| word.to_le_bytes()).collect();
        self.data.push((address, bytes));
        self
    }

    pub fn data_bytes(&mut self, address: u32, bytes: &[u8]) -> &mut Self {
        self.data.push((address, bytes.to_vec()));
        self
    }

    fn address_of(&self, item: usize) -> u32 {
        self.base.wrapping_add(item as u32 * 4 * (1 + self.padding))
    }

    fn resolve(&self, label: &str) -> SimulatorResult<u32> {
        self.labels
            .get(label)
            .map(|&item| self.address_of(item))
            .ok_or_else(|| SimulatorError::UndefinedLabel(label.to_string()))
    }

    pub fn build(&self) -> SimulatorResult<Program> {
        let nop = Instruction::from_fields(Function::ADDI, 0, 0, 0, 0)?;
        let mut instructions = Vec::new();

        for (index, item) in self.items.iter().enumerate() {
            let address = self.address_of(index);
            let offset_to = |label: &str| -> SimulatorResult<i32> {
                Ok(self.resolve(label)?.wrapping_sub(address) as i32)
            };
            let inst = match item {
                Item::Fixed { function, rd, rs1, rs2, imm } => {
                    Instruction::from_fields(*function, *rd, *rs1, *rs2, *imm)?
                }
                Item::Branch { function, rs1, rs2, label } => {
                    Instruction::from_fields(*function, 0, *rs1, *rs2, offset_to(label)?)?
                }
                Item::Jump { rd, label } => {
                    Instruction::from_fields(Function::JAL, *rd, 0, 0, offset_to(label)?)?
                }
            };
            instructions.push(inst);
            instructions.extend(std::iter::repeat(nop).take(self.padding as usize));
        }

        let entry = match &self.entry {
            Some(label) => self.resolve(label)?,
            None => self.base,
        };
        let labels = self
            .labels
            .iter()
            .map(|(name, &item)| (name.clone(), self.address_of(item)))
            .collect();
        Ok(Program { base: self.base, instructions, labels, data: self.data.clone(), entry })
    }
}
