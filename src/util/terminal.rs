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

pub fn markdown_print(markdown: &str) {
    termimad::print_text(markdown);
}

pub fn banner(msg: &str) {
    let markdown = format!("|:-|\n\
                            |{}|\n\
                            |-", msg);
    markdown_print(&markdown);
}

/// Render rows under a header row; every row must have as many cells as the header.
pub fn table(headers: &[&str], rows: &[Vec<String>]) {
    let columns = headers.len();
    let separator = |align: &str| format!("|{}\n", vec![align; columns].join("|"));

    let mut buffer = separator(":-");
    buffer.push_str(&format!("|{}\n", headers.join("|")));
    for row in rows.iter() {
        buffer.push_str(&separator("-"));
        buffer.push_str(&format!("|{}\n", row.join("|")));
    }
    buffer.push_str(&separator("-"));
    markdown_print(&buffer);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner() {
        // Just verify it doesn't panic
        banner("CLUSTER: demo (2 nodes)");
    }

    #[test]
    fn test_table() {
        let rows = vec![
            vec![String::from("node1"), String::from("Ubuntu"), String::from("5901")],
            vec![String::from("node2"), String::from("Alma9"), String::from("5902")],
        ];
        table(&["node", "guest", "vnc"], &rows);
    }

    #[test]
    fn test_table_empty() {
        // Should handle empty tables gracefully
        table(&["node", "guest"], &[]);
    }
}
