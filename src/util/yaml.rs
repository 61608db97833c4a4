// kvmdeploy
// Copyright (C) Riff Labs Limited <team@riff.cc>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// long with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::path::Path;
use crate::util::terminal::banner;

const YAML_ERROR_SHOW_LINES: usize = 5;
const YAML_ERROR_WIDTH: usize = 180; // things will wrap in terminal anyway

/// Excerpt of `contents` around the line a YAML error points at, with the
/// offending line marked. Empty when the error carries no location.
pub fn error_excerpt(yaml_error: &serde_yaml::Error, contents: &str) -> Vec<String> {
    let location = match yaml_error.location() {
        Some(location) => location,
        None => return Vec::new(),
    };
    let error_line = location.line();
    let error_column = location.column();

    let show_start = error_line.saturating_sub(YAML_ERROR_SHOW_LINES).max(1);
    let show_stop = error_line + YAML_ERROR_SHOW_LINES;

    contents
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line))
        .filter(|(count, _)| *count >= show_start && *count <= show_stop)
        .map(|(count, line)| {
            if count == error_line {
                format!("     {count:5}:{error_column:5} | >>> | {}", line)
            } else {
                format!("     {count:5}       |     | {}", line)
            }
        })
        .collect()
}

pub fn show_yaml_error_in_context(yaml_error: &serde_yaml::Error, path: &Path, contents: &str) {
    let mut yaml_error_str = yaml_error.to_string();
    if yaml_error_str.len() > YAML_ERROR_WIDTH {
        let mut cut = YAML_ERROR_WIDTH - 3;
        while !yaml_error_str.is_char_boundary(cut) {
            cut -= 1;
        }
        yaml_error_str.truncate(cut);
        yaml_error_str.push_str("...");
    }

    println!();
    banner(&format!("Error reading YAML file: {}, {}", path.display(), yaml_error_str));
    println!();
    for line in error_excerpt(yaml_error, contents) {
        println!("{}", line);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_excerpt_marks_line() {
        let contents = "clusterName: demo\ncpu: 2\nnodes: [\n  - name: a\n";
        let err = serde_yaml::from_str::<serde_yaml::Value>(contents).unwrap_err();
        let excerpt = error_excerpt(&err, contents);
        assert!(!excerpt.is_empty());
        assert_eq!(excerpt.iter().filter(|l| l.contains(">>>")).count(), 1);
    }

    #[test]
    fn test_error_excerpt_without_location() {
        #[derive(serde::Deserialize, Debug)]
        #[allow(dead_code)]
        struct Needs { cpu: u32 }
        let err = serde_yaml::from_str::<Needs>("{}").unwrap_err();
        // missing field errors may or may not carry a location, but must not panic
        let _ = error_excerpt(&err, "{}");
    }
}
