//! Free-form flight durations such as `"2h 50m"`, `"19h"` or `"45m"`.

use nom::{
    IResult,
    branch::alt,
    character::complete::{char, digit1, multispace0},
    combinator::{all_consuming, map_opt, map_res, opt},
    sequence::{delimited, pair, preceded, terminated},
};

/// Total minutes of a duration text, or `None` when the text is not a duration.
pub fn parse_minutes(text: &str) -> Option<u32> {
    all_consuming(delimited(multispace0, duration, multispace0))(text)
        .ok()
        .map(|(_, minutes)| minutes)
}

fn duration(input: &str) -> IResult<&str, u32> {
    alt((
        map_opt(
            pair(hours, opt(preceded(multispace0, minutes))),
            |(hours, minutes)| hours.checked_mul(60)?.checked_add(minutes.unwrap_or(0)),
        ),
        minutes,
    ))(input)
}

fn hours(input: &str) -> IResult<&str, u32> {
    terminated(number, char('h'))(input)
}

fn minutes(input: &str) -> IResult<&str, u32> {
    terminated(number, char('m'))(input)
}

fn number(input: &str) -> IResult<&str, u32> {
    map_res(digit1, str::parse::<u32>)(input)
}
