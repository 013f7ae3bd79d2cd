//! Compilation of path segment expressions into regular expressions.

use regex::Regex;

/// Compile a route segment containing PSEs into a regexp usable for a path
/// segment match.
///
/// # Panics
///
/// Panics when the resulting expression fails to compile. Registering a route
/// with a malformed PSE or `{re:...}` body is a programmer error caught at
/// startup, not a runtime condition.
pub(crate) fn segment_exp(pattern: &str) -> Regex {
    // "*" is shorthand for the wild catch-all; left alone in segments with a
    // verbatim expression, where it is regex syntax
    let p = if pattern.contains("{re:") {
        pattern.to_string()
    } else {
        pattern.replace('*', "{wild}")
    };

    // re: verbatim user-supplied expression, substituted before the other
    // rewrites so its body is never reinterpreted
    let p = rewrite(&p, r"\{re:(.+)\}", |caps| format!("({})", &caps[1]));

    // catch-all: matches anything, may overlap other matches
    let p = rewrite(&p, r"\{(\w+)\}", |caps| format!("(?P<{}>.+)", &caps[1]));

    // word: alphanumeric and underscore
    let p = rewrite(&p, r"\{word:(\w+)\}", |caps| format!(r"(?P<{}>\w+)", &caps[1]));

    // date: ISO 8601, https://en.wikipedia.org/wiki/ISO_8601
    // accepted values:
    //   YYYY
    //   YYYY-MM
    //   YYYY-MM-DD
    //   YYYY-MM-DDTHH
    //   YYYY-MM-DDTHH:MM
    //   YYYY-MM-DDTHH:MM:SS[.NN]
    //   YYYY-MM-DDTHH:MM:SS[.NN]Z
    //   YYYY-MM-DDTHH:MM:SS[.NN][+-]HH[:MM]
    let p = rewrite(&p, r"\{date:(\w+)\}", |caps| {
        let n = &caps[1];
        format!(
            "(?P<{n}>(\
             (?P<{n}_year>\\d{{4}})([/-]?(?P<{n}_mon>(0[1-9])|(1[012]))([/-]?(?P<{n}_mday>(0[1-9])|([12]\\d)|(3[01])))?)?\
             (?:T(?P<{n}_hour>([01][0-9])|(?:2[0123]))(:?(?P<{n}_min>[0-5][0-9])(:?(?P<{n}_sec>[0-5][0-9]([,.]\\d{{1,10}})?))?)?\
             (?:Z|([-+](?:([01][0-9])|(?:2[0123]))(:?(?:[0-5][0-9]))?))?)?\
             ))"
        )
    });

    // geo: location in decimal notation, http://tools.ietf.org/html/rfc5870
    // accepted values:
    //   lat,lon           (point)
    //   lat,lon,alt       (3d point)
    //   lat,lon;u=unc     (circle)
    //   lat,lon,alt;u=unc (sphere)
    //   lat,lon;crs=name  (point with coordinate reference system)
    let p = rewrite(&p, r"\{geo:(\w+)\}", |caps| {
        let n = &caps[1];
        format!(
            "(?P<{n}_lat>-?\\d+(\\.\\d+)?)[,;](?P<{n}_lon>-?\\d+(\\.\\d+)?)\
             ([,;](?P<{n}_alt>-?\\d+(\\.\\d+)?))?\
             (((?:;crs=)(?P<{n}_crs>[\\w-]+))?((?:;u=)(?P<{n}_u>-?\\d+(\\.\\d+)?))?)?"
        )
    });

    // hex: hexadecimal number with optional "0x" prefix
    let p = rewrite(&p, r"\{hex:(\w+)\}", |caps| {
        format!("(?P<{}>(?:0x)?[[:xdigit:]]+)", &caps[1])
    });

    // float: floating-point number in decimal notation
    let p = rewrite(&p, r"\{float:(\w+)\}", |caps| {
        format!(r"(?P<{}>[-+]?\d+\.\d+)", &caps[1])
    });

    // uint: unsigned integer, up to 10 digits
    let p = rewrite(&p, r"\{uint:(\w+)\}", |caps| {
        format!(r"(?P<{}>\d{{1,10}})", &caps[1])
    });

    // int: signed integer, up to 10 digits
    let p = rewrite(&p, r"\{int:(\w+)\}", |caps| {
        format!(r"(?P<{}>[-+]?\d{{1,10}})", &caps[1])
    });

    Regex::new(&p)
        .unwrap_or_else(|e| panic!("invalid path segment expression {pattern:?}: {e}"))
}

fn rewrite(segment: &str, rule: &str, replace: impl Fn(&regex::Captures) -> String) -> String {
    let rx = Regex::new(rule).expect("PSE rewrite rule failed to compile");
    rx.replace_all(segment, |caps: &regex::Captures| replace(caps))
        .into_owned()
}
