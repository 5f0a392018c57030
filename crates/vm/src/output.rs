//! Destination for text printed by `TRAP 0`.

use ember_common::RuntimeValue;
use std::cell::RefCell;
use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;

/// Shared writer for script output. Clones write to the same destination.
#[derive(Clone)]
pub struct Output(Rc<RefCell<dyn Write>>);

impl Output {
    pub fn stdout() -> Self {
        Self(Rc::new(RefCell::new(io::stdout())))
    }

    /// Output into `writer`, which the caller may keep a handle to.
    pub fn shared<W: Write + 'static>(writer: Rc<RefCell<W>>) -> Self {
        Self(writer)
    }

    pub(crate) fn write_line(&self, line: &str) -> io::Result<()> {
        let mut w = self.0.try_borrow_mut().map_err(io::Error::other)?;
        writeln!(w, "{line}")?;
        w.flush()
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::stdout()
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Output")
    }
}

/// Printed form of a value: floats use 16 significant digits, everything
/// else its `Display` form.
pub fn print_text(value: &RuntimeValue) -> String {
    match value {
        RuntimeValue::Float(x) => format_float(*x),
        other => other.to_string(),
    }
}

/// Shortest of fixed or exponent notation at 16 significant digits, with
/// trailing zeros removed.
fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".into();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.into();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0" } else { "0" }.into();
    }

    let sci = format!("{x:.15e}");
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    if !(-4..16).contains(&exp) {
        let sign = if exp < 0 { '-' } else { '+' };
        return format!("{}e{sign}{:02}", trim_zeros(mantissa), exp.abs());
    }
    let precision = (15 - exp) as usize;
    trim_zeros(&format!("{x:.precision$}")).to_string()
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_use_sixteen_significant_digits() {
        assert_eq!(format_float(3.5), "3.5");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(100.0), "100");
        assert_eq!(format_float(-2.25), "-2.25");
        assert_eq!(format_float(1.0 / 3.0), "0.3333333333333333");
        assert_eq!(format_float(1e20), "1e+20");
        assert_eq!(format_float(1.5e-7), "1.5e-07");
        assert_eq!(format_float(0.0), "0");
        assert_eq!(format_float(f64::NAN), "nan");
        assert_eq!(format_float(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn shared_output_collects_lines() {
        let buf = Rc::new(RefCell::new(Vec::new()));
        let out = Output::shared(buf.clone());
        out.write_line("a").unwrap();
        out.clone().write_line("b").unwrap();
        assert_eq!(String::from_utf8(buf.borrow().clone()).unwrap(), "a\nb\n");
    }
}
