use hb_core::{DecodeError, ErrorKind, ErrorReport};
use rhai::{EvalAltResult, ParseError, Position};

use crate::dispatch::HostException;

fn located(report: ErrorReport, position: Position) -> ErrorReport {
    report.at(position.line().unwrap_or(0), position.position())
}

pub(crate) fn report_from_parse(error: &ParseError, filename: &str) -> ErrorReport {
    located(
        ErrorReport::new(ErrorKind::Parse, error.err_type().to_string(), filename),
        error.position(),
    )
}

// One wrapper per script call level; the innermost error is the cause.
fn innermost(mut error: EvalAltResult) -> (EvalAltResult, Position) {
    let mut position = error.position();
    while let EvalAltResult::ErrorInFunctionCall(_, _, inner, _) = error {
        error = *inner;
        if !error.position().is_none() {
            position = error.position();
        }
    }
    (error, position)
}

fn message_without_position(mut error: EvalAltResult) -> String {
    let _ = error.take_position();
    error.to_string()
}

pub(crate) fn report_from_eval(error: Box<EvalAltResult>, filename: &str) -> ErrorReport {
    let (error, position) = innermost(*error);

    let report = match error {
        EvalAltResult::ErrorRuntime(value, _) => match value.clone().try_cast::<HostException>() {
            Some(exception) => ErrorReport::new(ErrorKind::Host, exception.message, filename)
                .with_code(exception.code),
            None => ErrorReport::new(ErrorKind::Runtime, value.to_string(), filename),
        },
        EvalAltResult::ErrorParsing(parse_error, _) => {
            ErrorReport::new(ErrorKind::Parse, parse_error.to_string(), filename)
        }
        EvalAltResult::ErrorSystem(message, cause) => ErrorReport::new(
            ErrorKind::Internal,
            format!("{}: {}", message, cause),
            filename,
        ),
        limit @ (EvalAltResult::ErrorTooManyOperations(_)
        | EvalAltResult::ErrorStackOverflow(_)
        | EvalAltResult::ErrorDataTooLarge(..)) => {
            ErrorReport::new(ErrorKind::Limit, message_without_position(limit), filename)
        }
        other => ErrorReport::new(ErrorKind::Runtime, message_without_position(other), filename),
    };
    located(report, position)
}

pub(crate) fn report_from_decode(error: &DecodeError, filename: &str) -> ErrorReport {
    ErrorReport::new(ErrorKind::Decode, error.to_string(), filename).with_code("BRIDGE_DECODE_ERROR")
}
