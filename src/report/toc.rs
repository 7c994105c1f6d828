//! Table-of-contents accounting.
//!
//! Entries are appended while sections are composed; the page counter is
//! advanced explicitly by the assembler after content expected to span a
//! page. The entry list is read-only once rendering starts.

const TOC_LINE_WIDTH: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub title: String,
    /// Nesting level, 1-3.
    pub level: u8,
    /// Page counter value at the moment of insertion.
    pub page_number: u32,
    /// Title of the owning level-1 entry, set only for deeper entries.
    pub parent: Option<String>,
}

#[derive(Debug, Default)]
pub struct Toc {
    entries: Vec<TocEntry>,
    current_page: u32,
    last_section: Option<String>,
}

impl Toc {
    pub fn new() -> Self {
        Self { entries: Vec::new(), current_page: 1, last_section: None }
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn add_entry(&mut self, title: impl Into<String>, level: u8) {
        let title = title.into();
        let level = level.clamp(1, 3);
        let parent = if level > 1 { self.last_section.clone() } else { None };
        if level == 1 {
            self.last_section = Some(title.clone());
        }
        self.entries.push(TocEntry { title, level, page_number: self.current_page, parent });
    }

    pub fn increment_page(&mut self) {
        self.current_page += 1;
    }

    pub fn entries(&self) -> &[TocEntry] {
        &self.entries
    }

    /// Render one entry as an indented, dot-filled line ending in the
    /// recorded page number.
    pub fn format_line(entry: &TocEntry) -> String {
        let indent = "  ".repeat(entry.level.saturating_sub(1) as usize);
        let title = format!("{}{}", indent, entry.title);
        let page = entry.page_number.to_string();
        let fill = TOC_LINE_WIDTH.saturating_sub(title.chars().count()).max(3);
        format!("{}{}{}", title, ".".repeat(fill), page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_numbers_are_nondecreasing_in_insertion_order() {
        let mut toc = Toc::new();
        toc.add_entry("Cover", 1);
        toc.increment_page();
        toc.add_entry("Summary", 1);
        toc.add_entry("Overview", 2);
        toc.increment_page();
        toc.increment_page();
        toc.add_entry("Chapter 1", 1);

        let pages: Vec<u32> = toc.entries().iter().map(|e| e.page_number).collect();
        assert!(pages.windows(2).all(|w| w[0] <= w[1]), "pages {:?} not monotone", pages);
        assert_eq!(pages, vec![1, 2, 2, 4]);
    }

    #[test]
    fn deeper_entries_record_their_level_one_parent() {
        let mut toc = Toc::new();
        toc.add_entry("Chapter", 1);
        toc.add_entry("Detail", 2);
        toc.add_entry("Deeper", 3);
        toc.add_entry("Next Chapter", 1);

        assert_eq!(toc.entries()[0].parent, None);
        assert_eq!(toc.entries()[1].parent.as_deref(), Some("Chapter"));
        assert_eq!(toc.entries()[2].parent.as_deref(), Some("Chapter"));
        assert_eq!(toc.entries()[3].parent, None);
    }

    #[test]
    fn lines_are_indented_and_dot_filled() {
        let entry =
            TocEntry { title: "Overview".into(), level: 2, page_number: 3, parent: None };
        let line = Toc::format_line(&entry);
        assert!(line.starts_with("  Overview"));
        assert!(line.ends_with("3"));
        assert!(line.contains("..."));
    }

    #[test]
    fn long_titles_keep_a_minimum_fill() {
        let entry = TocEntry {
            title: "x".repeat(80),
            level: 1,
            page_number: 12,
            parent: None,
        };
        let line = Toc::format_line(&entry);
        assert!(line.contains("...12"));
    }
}
