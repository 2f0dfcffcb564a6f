// libs/appointment-cell/src/services/otp_input.rs
use crate::services::validation::OTP_LENGTH;

/// Six single-digit cells with a focus cursor. Submission concatenates the
/// cells left to right.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OtpInput {
    cells: [Option<char>; OTP_LENGTH],
    focus: usize,
}

/// One keystroke against a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpKey {
    Text(String),
    Backspace,
}

impl OtpInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    /// Apply a keystroke on `index`. Returns false when the input was
    /// ignored (out of range or more than one digit).
    pub fn apply(&mut self, index: usize, key: OtpKey) -> bool {
        match key {
            OtpKey::Text(text) => self.type_into(index, &text),
            OtpKey::Backspace => self.backspace(index),
        }
    }

    /// Non-digits are stripped first; a single remaining digit fills the
    /// cell and focus moves right. An empty result clears the cell.
    pub fn type_into(&mut self, index: usize, text: &str) -> bool {
        if index >= OTP_LENGTH {
            return false;
        }

        let digits: Vec<char> = text.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() > 1 {
            return false;
        }

        self.cells[index] = digits.first().copied();
        self.focus = if digits.is_empty() {
            index
        } else {
            (index + 1).min(OTP_LENGTH - 1)
        };
        true
    }

    /// A filled cell is cleared in place. An empty cell moves focus to the
    /// previous cell and clears it.
    pub fn backspace(&mut self, index: usize) -> bool {
        if index >= OTP_LENGTH {
            return false;
        }

        if self.cells[index].is_some() {
            self.cells[index] = None;
            self.focus = index;
        } else if index > 0 {
            self.cells[index - 1] = None;
            self.focus = index - 1;
        } else {
            self.focus = 0;
        }
        true
    }

    /// Replace every cell from a pasted code. Non-digits are dropped and
    /// anything past the sixth digit is ignored.
    pub fn fill(&mut self, code: &str) {
        self.clear();
        for (slot, digit) in self
            .cells
            .iter_mut()
            .zip(code.chars().filter(|c| c.is_ascii_digit()))
        {
            *slot = Some(digit);
        }
        let filled = self.cells.iter().filter(|c| c.is_some()).count();
        self.focus = filled.min(OTP_LENGTH - 1);
    }

    pub fn clear(&mut self) {
        self.cells = [None; OTP_LENGTH];
        self.focus = 0;
    }

    pub fn code(&self) -> String {
        self.cells.iter().flatten().collect()
    }

    pub fn is_complete(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    pub fn cells(&self) -> Vec<String> {
        self.cells
            .iter()
            .map(|cell| cell.map(String::from).unwrap_or_default())
            .collect()
    }
}
