use base::onescomplement::{self, add_halves, add_thirds, divide, multiply};
use base::prelude::*;

use super::{Completion, Engine};
use crate::designator::db;
use crate::interrupt::{ArithmeticExceptionKind, Interrupt, OperationTrapKind};

fn identity(w: Word36) -> Word36 {
    w
}

fn negated_magnitude(w: Word36) -> Word36 {
    w.magnitude().negate()
}

/// ## Fixed-point binary instructions
///
/// - AA, ANA, AMA, ANMA: add to Aa
/// - AU, ANU: add to Aa, result in Aa+1
/// - AX, ANX: add to Xa
/// - MI, MSI, MF: multiply
/// - DI, DSF, DF: divide
/// - DA, DAN: double-word add
/// - AH, ANH, AT, ANT: add halves or thirds, no designators
impl Engine {
    /// Sets DB18 and DB19 for a sum.  Overflow traps if DB27 is set;
    /// the result has already been stored by then.
    fn record_carry_and_overflow(&mut self, carry: bool, overflow: bool) -> Result<(), Interrupt> {
        self.asp.dr.set_bit(db::CARRY, carry);
        self.asp.dr.set_bit(db::OVERFLOW, overflow);
        if overflow && self.asp.dr.operation_trap_enabled() {
            Err(Interrupt::OperationTrap(
                OperationTrapKind::FixedPointBinaryOverflow,
            ))
        } else {
            Ok(())
        }
    }

    fn add_into(&mut self, source: usize, dest: usize, transform: fn(Word36) -> Word36) -> Result<Completion, Interrupt> {
        let operand = resolved!(self.get_operand(true, true, true, true));
        let sum = onescomplement::add(self.grs[source], transform(operand));
        self.grs[dest] = sum.value;
        self.record_carry_and_overflow(sum.carry, sum.overflow)?;
        Ok(Completion::Complete)
    }

    pub(crate) fn op_aa(&mut self) -> Result<Completion, Interrupt> {
        let a = self.a_index(0);
        self.add_into(a, a, identity)
    }

    pub(crate) fn op_ana(&mut self) -> Result<Completion, Interrupt> {
        let a = self.a_index(0);
        self.add_into(a, a, Word36::negate)
    }

    pub(crate) fn op_ama(&mut self) -> Result<Completion, Interrupt> {
        let a = self.a_index(0);
        self.add_into(a, a, Word36::magnitude)
    }

    pub(crate) fn op_anma(&mut self) -> Result<Completion, Interrupt> {
        let a = self.a_index(0);
        self.add_into(a, a, negated_magnitude)
    }

    pub(crate) fn op_au(&mut self) -> Result<Completion, Interrupt> {
        self.add_into(self.a_index(0), self.a_index(1), identity)
    }

    pub(crate) fn op_anu(&mut self) -> Result<Completion, Interrupt> {
        self.add_into(self.a_index(0), self.a_index(1), Word36::negate)
    }

    pub(crate) fn op_ax(&mut self) -> Result<Completion, Interrupt> {
        let x = self.xa_index();
        self.add_into(x, x, identity)
    }

    pub(crate) fn op_anx(&mut self) -> Result<Completion, Interrupt> {
        let x = self.xa_index();
        self.add_into(x, x, Word36::negate)
    }

    /// Multiply integer: the 72-bit product goes to Aa, Aa+1.
    pub(crate) fn op_mi(&mut self) -> Result<Completion, Interrupt> {
        let operand = resolved!(self.get_operand(true, true, true, true));
        let product = multiply(self.a_reg(0), operand);
        self.set_a_reg(0, product.high);
        self.set_a_reg(1, product.low);
        Ok(Completion::Complete)
    }

    /// Multiply single integer: the product must fit in one word.  On
    /// overflow DB19 is set and, if DB27 is set, Aa is left alone.
    pub(crate) fn op_msi(&mut self) -> Result<Completion, Interrupt> {
        const MAX_SINGLE: i128 = (1 << 35) - 1;
        let operand = resolved!(self.get_operand(true, true, true, true));
        let product = multiply(self.a_reg(0), operand);
        if product.to_i128().abs() > MAX_SINGLE {
            self.asp.dr.set_bit(db::OVERFLOW, true);
            if self.asp.dr.operation_trap_enabled() {
                return Err(Interrupt::OperationTrap(
                    OperationTrapKind::MultiplySingleIntegerOverflow,
                ));
            }
        }
        self.set_a_reg(0, product.low);
        Ok(Completion::Complete)
    }

    /// Multiply fractional: the product shifted left one place, so
    /// the binary point stays just right of the sign.
    pub(crate) fn op_mf(&mut self) -> Result<Completion, Interrupt> {
        let operand = resolved!(self.get_operand(true, true, true, true));
        let product = multiply(self.a_reg(0), operand);
        let shifted = product.magnitude().shift_left_logical(1);
        let result = if product.is_negative() {
            shifted.negate()
        } else {
            shifted
        };
        self.set_a_reg(0, result.high);
        self.set_a_reg(1, result.low);
        Ok(Completion::Complete)
    }

    /// Handles a failed division: an arithmetic exception if DB29 is
    /// set, otherwise DB23 is set and the instruction completes.
    fn divide_check(&mut self) -> Result<Completion, Interrupt> {
        if self.asp.dr.arithmetic_exception_enabled() {
            Err(Interrupt::ArithmeticException(
                ArithmeticExceptionKind::DivideCheck,
            ))
        } else {
            self.asp.dr.set_bit(db::DIVIDE_CHECK, true);
            Ok(Completion::Complete)
        }
    }

    /// Divide integer: (Aa,Aa+1) by the operand; quotient to Aa,
    /// remainder to Aa+1.
    pub(crate) fn op_di(&mut self) -> Result<Completion, Interrupt> {
        let operand = resolved!(self.get_operand(true, true, true, true));
        let dividend = DoubleWord::new(self.a_reg(0), self.a_reg(1));
        match divide(dividend, operand) {
            Ok((quotient, remainder)) => {
                self.set_a_reg(0, quotient);
                self.set_a_reg(1, remainder);
                Ok(Completion::Complete)
            }
            Err(_) => self.divide_check(),
        }
    }

    /// Divide single fractional: Aa, extended by its sign and shifted
    /// right one place, by the operand; quotient to Aa+1.
    pub(crate) fn op_dsf(&mut self) -> Result<Completion, Interrupt> {
        let operand = resolved!(self.get_operand(true, true, true, true));
        let a = self.a_reg(0);
        let fill = if a.is_negative() {
            Word36::NEGATIVE_ZERO
        } else {
            Word36::ZERO
        };
        let dividend = DoubleWord::new(a, fill).shift_right_algebraic(1);
        match divide(dividend, operand) {
            Ok((quotient, _)) => {
                self.set_a_reg(1, quotient);
                Ok(Completion::Complete)
            }
            Err(_) => self.divide_check(),
        }
    }

    /// Divide fractional: (Aa,Aa+1) shifted right one place by the
    /// operand; quotient to Aa, remainder to Aa+1.
    pub(crate) fn op_df(&mut self) -> Result<Completion, Interrupt> {
        let operand = resolved!(self.get_operand(true, true, true, true));
        let dividend = DoubleWord::new(self.a_reg(0), self.a_reg(1)).shift_right_algebraic(1);
        match divide(dividend, operand) {
            Ok((quotient, remainder)) => {
                self.set_a_reg(0, quotient);
                self.set_a_reg(1, remainder);
                Ok(Completion::Complete)
            }
            Err(_) => self.divide_check(),
        }
    }

    fn double_add(&mut self, negate: bool) -> Result<Completion, Interrupt> {
        let words = resolved!(self.get_consecutive_operands(true, 2));
        let operand = DoubleWord::new(words[0], words[1]);
        let operand = if negate { operand.negate() } else { operand };
        let sum = DoubleWord::new(self.a_reg(0), self.a_reg(1)).add(operand);
        self.set_a_reg(0, sum.value.high);
        self.set_a_reg(1, sum.value.low);
        self.record_carry_and_overflow(sum.carry, sum.overflow)?;
        Ok(Completion::Complete)
    }

    pub(crate) fn op_da(&mut self) -> Result<Completion, Interrupt> {
        self.double_add(false)
    }

    pub(crate) fn op_dan(&mut self) -> Result<Completion, Interrupt> {
        self.double_add(true)
    }

    fn add_fields(&mut self, add: fn(Word36, Word36) -> Word36, negate: bool) -> Result<Completion, Interrupt> {
        let operand = resolved!(self.get_operand(true, true, true, true));
        let operand = if negate { operand.negate() } else { operand };
        let result = add(self.a_reg(0), operand);
        self.set_a_reg(0, result);
        Ok(Completion::Complete)
    }

    pub(crate) fn op_ah(&mut self) -> Result<Completion, Interrupt> {
        self.add_fields(add_halves, false)
    }

    pub(crate) fn op_anh(&mut self) -> Result<Completion, Interrupt> {
        self.add_fields(add_halves, true)
    }

    pub(crate) fn op_at(&mut self) -> Result<Completion, Interrupt> {
        self.add_fields(add_thirds, false)
    }

    pub(crate) fn op_ant(&mut self) -> Result<Completion, Interrupt> {
        self.add_fields(add_thirds, true)
    }
}
