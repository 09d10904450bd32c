//! Built-in types and free functions: `Array`, `Range`, `Slice`, `Complex`,
//! `Console`, `Math`, `Debug`, `Runtime`, and the global `print`/`println`/
//! `eprint`/`eprintln`/`eval`/`sleep` functions. `String` methods are handled
//! separately in [`call_string_method`] since `Value::String` never carries
//! a `TypeRef` the way `Value::Object` does.
//!
//! Every intrinsic type is a lazily-created, process-wide singleton reached
//! through [`Interpreter::primitive_type`]; `install` below just seeds the
//! global scope with bindings for their names and pre-populates their method
//! tables once, up front.

use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::error::{ErrorKind, RuntimeError, RuntimeErrorKind};
use crate::interpreter::{Interpreter, Unwind};
use crate::object::{Payload, RuntimeObject, RuntimeObjectRef, TypeRef};
use crate::scope::{Binding, BindingFlags};
use crate::token::Span;
use crate::value::Value;

pub fn install(interp: &mut Interpreter) {
    install_array(interp);
    install_range(interp);
    install_slice(interp);
    install_complex(interp);
    install_console(interp);
    install_math(interp);
    install_debug(interp);
    install_runtime(interp);
    install_globals(interp);
}

fn bind_type(interp: &mut Interpreter, ty: TypeRef) {
    let name = ty.name.clone();
    interp.scope.add(&name, Binding { value: Value::Type(ty), flags: BindingFlags::CLASS, arity: -1 });
}

fn bind_global(interp: &mut Interpreter, name: &str, arity: i8, f: crate::value::NativeFn) {
    interp.scope.add(name, Binding { value: Value::NativeFunction(f), flags: BindingFlags::NATIVE, arity });
}

fn type_mismatch(message: impl Into<String>, span: Span) -> RuntimeError {
    RuntimeError::new(RuntimeErrorKind::TypeMismatch, message, span)
}

fn as_object(v: &Value, span: Span) -> Result<RuntimeObjectRef, RuntimeError> {
    match v {
        Value::Object(o) => Ok(o.clone()),
        _ => Err(type_mismatch(format!("expected an object, got {}", v.type_name()), span)),
    }
}

// ---------- Array ----------

fn install_array(interp: &mut Interpreter) {
    let ty = interp.primitive_type("Array");
    ty.add_native_method("Count", 0, false, array_count);
    ty.add_native_method("IsEmpty", 0, false, array_is_empty);
    ty.add_native_method("Clear", 0, false, array_clear);
    ty.add_native_method("Clone", 0, false, array_clone);
    ty.add_native_method("Reverse", 0, false, array_reverse);
    ty.add_native_method("Add", 1, false, array_add);
    ty.add_native_method("Append", 1, false, array_append);
    ty.add_native_method("RemoveAt", 1, false, array_remove_at);
    ty.add_native_method("Resize", 1, false, array_resize);
    ty.add_native_method("Slice", 2, false, array_slice);
    ty.add_native_method("QueryService", 1, false, array_query_service);
    ty.add_native_method("Array", 0, true, array_ctor);
    bind_type(interp, ty);
}

fn array_count(_i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let obj = as_object(&args[0], span)?;
    let result = match &obj.borrow().payload {
        Payload::Array(items) => Ok(Value::Integer(items.len() as i64)),
        _ => Err(type_mismatch("Count requires an Array", span)),
    };
    result
}

fn array_is_empty(_i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let obj = as_object(&args[0], span)?;
    let result = match &obj.borrow().payload {
        Payload::Array(items) => Ok(Value::Boolean(items.is_empty())),
        _ => Err(type_mismatch("IsEmpty requires an Array", span)),
    };
    result
}

fn array_clear(_i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let obj = as_object(&args[0], span)?;
    match &mut obj.borrow_mut().payload {
        Payload::Array(items) => items.clear(),
        _ => return Err(type_mismatch("Clear requires an Array", span)),
    }
    Ok(Value::Null)
}

fn array_clone(i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let obj = as_object(&args[0], span)?;
    let items = match &obj.borrow().payload {
        Payload::Array(items) => items.clone(),
        _ => return Err(type_mismatch("Clone requires an Array", span)),
    };
    let ty = i.primitive_type("Array");
    Ok(Value::Object(RuntimeObject::with_payload(ty, Payload::Array(items))))
}

fn array_reverse(_i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let obj = as_object(&args[0], span)?;
    match &mut obj.borrow_mut().payload {
        Payload::Array(items) => items.reverse(),
        _ => return Err(type_mismatch("Reverse requires an Array", span)),
    }
    Ok(Value::Null)
}

fn array_add(_i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let obj = as_object(&args[0], span)?;
    match &mut obj.borrow_mut().payload {
        Payload::Array(items) => items.push(args[1].clone()),
        _ => return Err(type_mismatch("Add requires an Array", span)),
    }
    Ok(Value::Null)
}

fn array_append(_i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let other = as_object(&args[1], span)?;
    let extra = match &other.borrow().payload {
        Payload::Array(items) => items.clone(),
        _ => return Err(type_mismatch("Append requires an Array argument", span)),
    };
    let obj = as_object(&args[0], span)?;
    match &mut obj.borrow_mut().payload {
        Payload::Array(items) => items.extend(extra),
        _ => return Err(type_mismatch("Append requires an Array", span)),
    }
    Ok(Value::Null)
}

fn array_remove_at(_i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let idx = args[1].to_integer(span)?;
    let obj = as_object(&args[0], span)?;
    let result = match &mut obj.borrow_mut().payload {
        Payload::Array(items) => {
            if idx < 0 || idx as usize >= items.len() {
                return Err(RuntimeError::new(RuntimeErrorKind::IndexOutOfRange, format!("index {} out of range", idx), span));
            }
            Ok(items.remove(idx as usize))
        }
        _ => Err(type_mismatch("RemoveAt requires an Array", span)),
    };
    result
}

fn array_resize(_i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let n = args[1].to_integer(span)?;
    if n < 0 {
        return Err(RuntimeError::new(RuntimeErrorKind::IndexOutOfRange, "Resize requires a non-negative length", span));
    }
    let obj = as_object(&args[0], span)?;
    match &mut obj.borrow_mut().payload {
        Payload::Array(items) => items.resize(n as usize, Value::Null),
        _ => return Err(type_mismatch("Resize requires an Array", span)),
    }
    Ok(Value::Null)
}

fn array_slice(i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let start = args[1].to_integer(span)?;
    let count = args[2].to_integer(span)?;
    let ty = i.primitive_type("Slice");
    Ok(Value::Object(RuntimeObject::with_payload(
        ty,
        Payload::Slice { target: Box::new(args[0].clone()), start, len: Some(count) },
    )))
}

fn array_query_service(_i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    query_service(&args[1], span, &["Cloneable", "Sliceable"])
}

fn array_ctor(i: &mut Interpreter, _args: &[Value], _span: Span) -> Result<Value, RuntimeError> {
    let ty = i.primitive_type("Array");
    Ok(Value::Object(RuntimeObject::with_payload(ty, Payload::Array(Vec::new()))))
}

fn query_service(name: &Value, span: Span, capabilities: &[&str]) -> Result<Value, RuntimeError> {
    let name = name.to_display_string();
    let _ = span;
    Ok(Value::Boolean(capabilities.contains(&name.as_str())))
}

// ---------- Range ----------

fn install_range(interp: &mut Interpreter) {
    let ty = interp.primitive_type("Range");
    ty.add_native_method("Size", 0, false, range_size);
    ty.add_native_method("Start", 0, false, range_start);
    ty.add_native_method("End", 0, false, range_end);
    ty.add_native_method("Shift", 1, false, range_shift);
    ty.add_native_method("IsInRange", 1, false, range_is_in_range);
    ty.add_native_method("Range", 2, true, range_ctor);
    bind_type(interp, ty);
}

fn as_range(v: &Value, span: Span) -> Result<(i64, i64, bool), RuntimeError> {
    let obj = as_object(v, span)?;
    let result = match obj.borrow().payload {
        Payload::Range { start, end, inclusive } => Ok((start, end, inclusive)),
        _ => Err(type_mismatch("expected a Range", span)),
    };
    result
}

fn range_size(_i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let (start, end, inclusive) = as_range(&args[0], span)?;
    let size = if inclusive { end - start + 1 } else { end - start };
    Ok(Value::Integer(size.max(0)))
}

fn range_start(_i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    Ok(Value::Integer(as_range(&args[0], span)?.0))
}

fn range_end(_i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    Ok(Value::Integer(as_range(&args[0], span)?.1))
}

fn range_shift(i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let (start, end, inclusive) = as_range(&args[0], span)?;
    let n = args[1].to_integer(span)?;
    let ty = i.primitive_type("Range");
    Ok(Value::Object(RuntimeObject::with_payload(ty, Payload::Range { start: start + n, end: end + n, inclusive })))
}

fn range_is_in_range(_i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let (start, end, inclusive) = as_range(&args[0], span)?;
    let v = args[1].to_integer(span)?;
    let last = if inclusive { end } else { end - 1 };
    Ok(Value::Boolean(v >= start && v <= last))
}

fn range_ctor(i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let start = args[1].to_integer(span)?;
    let end = args[2].to_integer(span)?;
    let ty = i.primitive_type("Range");
    Ok(Value::Object(RuntimeObject::with_payload(ty, Payload::Range { start, end, inclusive: false })))
}

// ---------- Slice ----------

fn install_slice(interp: &mut Interpreter) {
    let ty = interp.primitive_type("Slice");
    ty.add_native_method("Count", 0, false, slice_count);
    ty.add_native_method("Size", 0, false, slice_count);
    ty.add_native_method("Clone", 0, false, slice_clone);
    ty.add_native_method("QueryService", 1, false, slice_query_service);
    bind_type(interp, ty);
}

fn slice_count(_i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let obj = as_object(&args[0], span)?;
    let (target, start, len) = match &obj.borrow().payload {
        Payload::Slice { target, start, len } => ((**target).clone(), *start, *len),
        _ => return Err(type_mismatch("Count requires a Slice", span)),
    };
    if let Some(len) = len {
        // An explicit length always wins, including the "open-ended" `len < 0`
        // sentinel, which a caller must bounds-check probe by probe instead.
        return Ok(Value::Integer(len.max(0)));
    }
    let target_len = match target {
        Value::String(s) => s.len() as i64,
        Value::Object(o) => match &o.borrow().payload {
            Payload::Array(items) => items.len() as i64,
            _ => 0,
        },
        _ => 0,
    };
    Ok(Value::Integer((target_len - start).max(0)))
}

fn slice_clone(i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let obj = as_object(&args[0], span)?;
    let (target, start, len) = match &obj.borrow().payload {
        Payload::Slice { target, start, len } => (target.clone(), *start, *len),
        _ => return Err(type_mismatch("Clone requires a Slice", span)),
    };
    let ty = i.primitive_type("Slice");
    Ok(Value::Object(RuntimeObject::with_payload(ty, Payload::Slice { target, start, len })))
}

fn slice_query_service(_i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    query_service(&args[1], span, &["Cloneable", "Sliceable"])
}

// ---------- Complex ----------

fn install_complex(interp: &mut Interpreter) {
    let ty = interp.primitive_type("Complex");
    ty.add_native_method("Real", 0, false, complex_real);
    ty.add_native_method("Image", 0, false, complex_image);
    ty.add_native_method("Length", 0, false, complex_length);
    ty.add_native_method("LengthSquared", 0, false, complex_length_squared);
    ty.add_native_method("op_add", 1, false, complex_add);
    ty.add_native_method("op_sub", 1, false, complex_sub);
    ty.add_native_method("op_mul", 1, false, complex_mul);
    ty.add_native_method("op_div", 1, false, complex_div);
    ty.add_native_method("Complex", 2, true, complex_ctor);
    bind_type(interp, ty);
}

fn as_complex(v: &Value, span: Span) -> Result<(f64, f64), RuntimeError> {
    let obj = as_object(v, span)?;
    let result = match obj.borrow().payload {
        Payload::Complex { re, im } => Ok((re, im)),
        _ => Err(type_mismatch("expected a Complex", span)),
    };
    result
}

fn complex_real(_i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    Ok(Value::Real(as_complex(&args[0], span)?.0))
}

fn complex_image(_i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    Ok(Value::Real(as_complex(&args[0], span)?.1))
}

fn complex_length(_i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let (re, im) = as_complex(&args[0], span)?;
    Ok(Value::Real((re * re + im * im).sqrt()))
}

fn complex_length_squared(_i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let (re, im) = as_complex(&args[0], span)?;
    Ok(Value::Real(re * re + im * im))
}

fn new_complex(i: &mut Interpreter, re: f64, im: f64) -> Value {
    let ty = i.primitive_type("Complex");
    Value::Object(RuntimeObject::with_payload(ty, Payload::Complex { re, im }))
}

fn complex_add(i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let (a, b) = (as_complex(&args[0], span)?, rhs_complex(&args[1], span)?);
    Ok(new_complex(i, a.0 + b.0, a.1 + b.1))
}

fn complex_sub(i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let (a, b) = (as_complex(&args[0], span)?, rhs_complex(&args[1], span)?);
    Ok(new_complex(i, a.0 - b.0, a.1 - b.1))
}

fn complex_mul(i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let (a, b) = (as_complex(&args[0], span)?, rhs_complex(&args[1], span)?);
    Ok(new_complex(i, a.0 * b.0 - a.1 * b.1, a.0 * b.1 + a.1 * b.0))
}

fn complex_div(i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let (a, b) = (as_complex(&args[0], span)?, rhs_complex(&args[1], span)?);
    let denom = b.0 * b.0 + b.1 * b.1;
    if denom == 0.0 {
        return Err(RuntimeError::new(RuntimeErrorKind::DivisionByZero, "Complex division by zero", span));
    }
    Ok(new_complex(i, (a.0 * b.0 + a.1 * b.1) / denom, (a.1 * b.0 - a.0 * b.1) / denom))
}

/// The right-hand side of a Complex operator may be another Complex or a
/// plain number promoted to `(n, 0)`.
fn rhs_complex(v: &Value, span: Span) -> Result<(f64, f64), RuntimeError> {
    match v {
        Value::Object(_) => as_complex(v, span),
        _ => Ok((v.to_real(span)?, 0.0)),
    }
}

fn complex_ctor(i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let re = args[1].to_real(span)?;
    let im = args[2].to_real(span)?;
    let obj = as_object(&args[0], span)?;
    obj.borrow_mut().payload = Payload::Complex { re, im };
    let _ = i;
    Ok(args[0].clone())
}

// ---------- Console ----------

fn install_console(interp: &mut Interpreter) {
    let ty = interp.primitive_type("Console");
    ty.add_native_method("Write", 1, true, console_write);
    ty.add_native_method("WriteLine", 1, true, console_write_line);
    ty.add_native_method("Error", 1, true, console_error);
    ty.add_native_method("ErrorLine", 1, true, console_error_line);
    ty.add_native_method("ReadLine", 0, true, console_read_line);
    bind_type(interp, ty);
}

fn console_write(_i: &mut Interpreter, args: &[Value], _span: Span) -> Result<Value, RuntimeError> {
    use std::io::Write;
    print!("{}", args[1].to_display_string());
    let _ = std::io::stdout().flush();
    Ok(Value::Null)
}

fn console_write_line(_i: &mut Interpreter, args: &[Value], _span: Span) -> Result<Value, RuntimeError> {
    println!("{}", args[1].to_display_string());
    Ok(Value::Null)
}

fn console_error(_i: &mut Interpreter, args: &[Value], _span: Span) -> Result<Value, RuntimeError> {
    eprint!("{}", args[1].to_display_string());
    Ok(Value::Null)
}

fn console_error_line(_i: &mut Interpreter, args: &[Value], _span: Span) -> Result<Value, RuntimeError> {
    eprintln!("{}", args[1].to_display_string());
    Ok(Value::Null)
}

fn console_read_line(_i: &mut Interpreter, _args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let mut line = String::new();
    match std::io::stdin().read_line(&mut line) {
        Ok(0) => Ok(Value::Null),
        Ok(_) => {
            if line.ends_with('\n') {
                line.pop();
                if line.ends_with('\r') {
                    line.pop();
                }
            }
            Ok(Value::string(line))
        }
        Err(e) => Err(RuntimeError::new(RuntimeErrorKind::InvalidType, format!("ReadLine failed: {}", e), span)),
    }
}

// ---------- Math ----------

fn install_math(interp: &mut Interpreter) {
    let ty = interp.primitive_type("Math");
    {
        let mut fields = ty.static_fields.borrow_mut();
        fields.insert("PI".to_string(), Value::Real(std::f64::consts::PI));
        fields.insert("E".to_string(), Value::Real(std::f64::consts::E));
        fields.insert("OneOverPI".to_string(), Value::Real(1.0 / std::f64::consts::PI));
        fields.insert("Sqr2".to_string(), Value::Real(std::f64::consts::SQRT_2));
        fields.insert("Sqr3".to_string(), Value::Real(3.0_f64.sqrt()));
        fields.insert("Ln2".to_string(), Value::Real(std::f64::consts::LN_2));
        fields.insert("Phi".to_string(), Value::Real((1.0 + 5.0_f64.sqrt()) / 2.0));
        fields.insert("Ln10".to_string(), Value::Real(std::f64::consts::LN_10));
    }
    macro_rules! unary {
        ($name:literal, $f:expr) => {
            ty.add_native_method($name, 1, true, |_i, args, span| {
                let x = args[1].to_real(span)?;
                let f: fn(f64) -> f64 = $f;
                Ok(Value::Real(f(x)))
            });
        };
    }
    unary!("Sin", f64::sin);
    unary!("Cos", f64::cos);
    unary!("Tan", f64::tan);
    unary!("Sinh", f64::sinh);
    unary!("Cosh", f64::cosh);
    unary!("Tanh", f64::tanh);
    unary!("ASin", f64::asin);
    unary!("ACos", f64::acos);
    unary!("ATan", f64::atan);
    unary!("Abs", f64::abs);
    unary!("Exp", f64::exp);
    unary!("Log", f64::log10);
    unary!("Ln", f64::ln);
    unary!("Floor", f64::floor);
    unary!("Trunc", f64::trunc);
    unary!("Round", f64::round);
    unary!("ASinh", f64::asinh);
    unary!("ACosh", f64::acosh);
    unary!("ATanh", f64::atanh);
    unary!("Sqrt", f64::sqrt);
    unary!("Gamma", gamma);
    ty.add_native_method("ATan2", 2, true, |_i, args, span| {
        Ok(Value::Real(args[1].to_real(span)?.atan2(args[2].to_real(span)?)))
    });
    ty.add_native_method("Power", 2, true, |_i, args, span| {
        Ok(Value::Real(args[1].to_real(span)?.powf(args[2].to_real(span)?)))
    });
    ty.add_native_method("Beta", 2, true, |_i, args, span| {
        let a = args[1].to_real(span)?;
        let b = args[2].to_real(span)?;
        Ok(Value::Real(gamma(a) * gamma(b) / gamma(a + b)))
    });
    bind_type(interp, ty);
}

/// Lanczos approximation (g = 7, n = 9), accurate to ~15 significant digits
/// over the real line outside the negative-integer poles.
fn gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    #[allow(clippy::excessive_precision)]
    const COEFFS: [f64; 9] = [
        0.99999999999980993,
        676.5203681218851,
        -1259.1392167224028,
        771.32342877765313,
        -176.61502916214059,
        12.507343278686905,
        -0.13857109526572012,
        9.9843695780195716e-6,
        1.5056327351493116e-7,
    ];
    if x < 0.5 {
        std::f64::consts::PI / ((std::f64::consts::PI * x).sin() * gamma(1.0 - x))
    } else {
        let x = x - 1.0;
        let mut a = COEFFS[0];
        let t = x + G + 0.5;
        for (i, c) in COEFFS.iter().enumerate().skip(1) {
            a += c / (x + i as f64);
        }
        (2.0 * std::f64::consts::PI).sqrt() * t.powf(x + 0.5) * (-t).exp() * a
    }
}

// ---------- Debug ----------

fn install_debug(interp: &mut Interpreter) {
    let ty = interp.primitive_type("Debug");
    ty.add_native_method("Assert", 1, true, debug_assert_fn);
    ty.add_native_method("Break", 0, true, debug_break);
    bind_type(interp, ty);
}

fn debug_assert_fn(_i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    if !args[1].to_boolean(span)? {
        return Err(RuntimeError::new(RuntimeErrorKind::AssertFailed, "assertion failed", span));
    }
    Ok(Value::Null)
}

fn debug_break(_i: &mut Interpreter, _args: &[Value], _span: Span) -> Result<Value, RuntimeError> {
    log::debug!("Debug.Break() hit");
    Ok(Value::Null)
}

// ---------- Runtime ----------

fn install_runtime(interp: &mut Interpreter) {
    let ty = interp.primitive_type("Runtime");
    ty.add_native_method("Sleep", 1, true, runtime_sleep);
    ty.add_native_method("Eval", 1, true, runtime_eval);
    ty.add_native_method("Ticks", 0, true, runtime_ticks);
    ty.add_native_method("DumpStats", 0, true, runtime_dump_stats);
    ty.add_native_method("CreateObject", -1, true, runtime_create_object);
    bind_type(interp, ty);
}

fn runtime_sleep(_i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let ms = args[1].to_integer(span)?;
    if ms > 0 {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }
    Ok(Value::Null)
}

static RUNTIME_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

fn runtime_ticks(_i: &mut Interpreter, _args: &[Value], _span: Span) -> Result<Value, RuntimeError> {
    let start = RUNTIME_START.get_or_init(Instant::now);
    Ok(Value::Integer(start.elapsed().as_millis() as i64))
}

fn runtime_dump_stats(i: &mut Interpreter, _args: &[Value], _span: Span) -> Result<Value, RuntimeError> {
    for (name, ty) in i.primitive_types.iter() {
        log::info!("{}: {} live object(s)", name, ty.object_count());
    }
    Ok(Value::Null)
}

fn runtime_create_object(i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let type_name = args.get(1).map(|v| v.to_display_string()).unwrap_or_default();
    let ctor_args: Vec<Value> = args.iter().skip(2).cloned().collect();
    let ty = match i.scope.find(&type_name, -1, false) {
        Some(Binding { value: Value::Type(t), .. }) => t.clone(),
        _ => return Err(RuntimeError::new(RuntimeErrorKind::UnknownIdentifier, format!("unknown type '{}'", type_name), span)),
    };
    match i.create_object(ty, &ctor_args, span) {
        Ok(v) => Ok(v),
        Err(Unwind::Error(e)) => Err(e),
        Err(_) => Err(RuntimeError::new(RuntimeErrorKind::InvalidType, "CreateObject constructor did not return normally", span)),
    }
}

pub fn runtime_eval(i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let source = args[1].to_display_string();
    let root = match i.parse_into_ast(&source) {
        Ok(root) => root,
        Err(_) => return Ok(Value::Error(ErrorKind::Parse)),
    };
    match i.run_program(root) {
        Ok(v) => Ok(v),
        Err(Unwind::Return(v)) => Ok(v),
        Err(Unwind::Error(e)) => Err(e),
        Err(_) => Err(RuntimeError::new(RuntimeErrorKind::InvalidType, "break/continue escaped Runtime.Eval", span)),
    }
}

// ---------- globals: print/println/eprint/eprintln/eval/sleep ----------

fn install_globals(interp: &mut Interpreter) {
    bind_global(interp, "print", -1, global_print);
    bind_global(interp, "println", -1, global_println);
    bind_global(interp, "eprint", -1, global_eprint);
    bind_global(interp, "eprintln", -1, global_eprintln);
    bind_global(interp, "eval", 1, global_eval);
    bind_global(interp, "sleep", 1, global_sleep);
}

/// `{}`-style positional placeholder substitution: a bare `{}` consumes the
/// next argument in order, `{N}` indexes explicitly, and `{{`/`}}` escape to
/// a literal brace. Up to six extra arguments are supported by the grammar
/// that calls into this (`InvokeFunction` caps argument lists long before
/// that), not by this function itself.
fn format_args(fmt: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(fmt.len());
    let mut chars = fmt.chars().peekable();
    let mut auto_index = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if chars.peek() == Some(&'}') {
                    chars.next();
                }
                let index = if digits.is_empty() {
                    let idx = auto_index;
                    auto_index += 1;
                    idx
                } else {
                    digits.parse().unwrap_or(0)
                };
                if let Some(v) = args.get(index) {
                    out.push_str(&v.to_display_string());
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn global_print(_i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    use std::io::Write;
    let fmt = args.first().map(|v| v.to_display_string()).unwrap_or_default();
    let _ = span;
    print!("{}", format_args(&fmt, &args[1.min(args.len())..]));
    let _ = std::io::stdout().flush();
    Ok(Value::Null)
}

fn global_println(_i: &mut Interpreter, args: &[Value], _span: Span) -> Result<Value, RuntimeError> {
    let fmt = args.first().map(|v| v.to_display_string()).unwrap_or_default();
    println!("{}", format_args(&fmt, &args[1.min(args.len())..]));
    Ok(Value::Null)
}

fn global_eprint(_i: &mut Interpreter, args: &[Value], _span: Span) -> Result<Value, RuntimeError> {
    let fmt = args.first().map(|v| v.to_display_string()).unwrap_or_default();
    eprint!("{}", format_args(&fmt, &args[1.min(args.len())..]));
    Ok(Value::Null)
}

fn global_eprintln(_i: &mut Interpreter, args: &[Value], _span: Span) -> Result<Value, RuntimeError> {
    let fmt = args.first().map(|v| v.to_display_string()).unwrap_or_default();
    eprintln!("{}", format_args(&fmt, &args[1.min(args.len())..]));
    Ok(Value::Null)
}

fn global_eval(i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    // `args[0]` here is the text itself: this is a free function, not a
    // method, so there is no receiver prepended.
    let wrapped = [Value::Null, args[0].clone()];
    runtime_eval(i, &wrapped, span)
}

fn global_sleep(i: &mut Interpreter, args: &[Value], span: Span) -> Result<Value, RuntimeError> {
    let wrapped = [Value::Null, args[0].clone()];
    runtime_sleep(i, &wrapped, span)
}

// ---------- String methods ----------

pub fn call_string_method(
    interp: &mut Interpreter,
    s: &Rc<String>,
    member: &str,
    args: &[Value],
    span: Span,
) -> Result<Value, RuntimeError> {
    match member {
        "Length" => Ok(Value::Integer(s.len() as i64)),
        "Clone" => Ok(Value::String(Rc::new((**s).clone()))),
        "Slice" => {
            if args.len() != 2 {
                return Err(RuntimeError::new(RuntimeErrorKind::WrongNumberArguments, "String.Slice expects 2 arguments", span));
            }
            let start = args[0].to_integer(span)?;
            let count = args[1].to_integer(span)?;
            let ty = interp.primitive_type("Slice");
            Ok(Value::Object(RuntimeObject::with_payload(
                ty,
                Payload::Slice { target: Box::new(Value::String(s.clone())), start, len: Some(count) },
            )))
        }
        "QueryService" => {
            if args.len() != 1 {
                return Err(RuntimeError::new(RuntimeErrorKind::WrongNumberArguments, "QueryService expects 1 argument", span));
            }
            query_service(&args[0], span, &["Cloneable", "Sliceable"])
        }
        _ => Err(RuntimeError::new(RuntimeErrorKind::MethodNotFound, format!("no method '{}' on String", member), span)),
    }
}
