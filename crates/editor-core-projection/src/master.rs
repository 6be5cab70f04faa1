//! The master document: the full text buffer projections are cut from.
//!
//! Edits are two-phase. [`MasterDocument::prepare_replace`] validates an edit and stamps it
//! with a unique [`EditId`]; [`MasterDocument::commit`] applies it. Whoever drives the edit
//! announces the prepared event to every projection before committing it and confirms it
//! afterwards (see [`ProjectionManager`](crate::ProjectionManager)).

use ropey::Rope;

use crate::error::ProjectionError;
use crate::intervals::{Region, TextEdit};

/// Identifier of a prepared master edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EditId(u64);

impl EditId {
    /// Get the underlying numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// A master edit: `length` characters at `offset` replaced by `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEvent {
    /// Edit identity, shared by the about-to-change and changed notifications.
    pub id: EditId,
    /// Start offset (characters).
    pub offset: usize,
    /// Number of replaced characters.
    pub length: usize,
    /// Replacement text.
    pub text: String,
}

impl DocumentEvent {
    /// The replaced master region.
    pub fn region(&self) -> Region {
        Region::new(self.offset, self.length)
    }

    /// Length of the replacement text in characters.
    pub fn inserted_len(&self) -> usize {
        self.text.chars().count()
    }

    /// The edit in tracker form.
    pub fn as_text_edit(&self) -> TextEdit {
        TextEdit::new(self.offset, self.length, self.inserted_len())
    }
}

/// Rope-backed master text, addressed in character offsets.
#[derive(Debug, Clone, Default)]
pub struct MasterDocument {
    rope: Rope,
    version: u64,
    next_edit: u64,
}

impl MasterDocument {
    /// Create a master document holding `text`.
    pub fn new(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
            version: 0,
            next_edit: 0,
        }
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.rope.len_chars()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.rope.len_chars() == 0
    }

    /// Full text.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    /// Text of `region`.
    pub fn get(&self, region: Region) -> Result<String, ProjectionError> {
        self.check_range(region)?;
        Ok(self.rope.slice(region.range()).to_string())
    }

    /// Number of lines (an empty document has one line).
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Number of committed edits.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Fail with [`ProjectionError::BadLocation`] unless `region` lies inside the document.
    pub fn check_range(&self, region: Region) -> Result<(), ProjectionError> {
        let document_length = self.len();
        if region.offset > document_length || region.length > document_length - region.offset
        {
            return Err(ProjectionError::BadLocation {
                offset: region.offset,
                length: region.length,
                document_length,
            });
        }
        Ok(())
    }

    /// Validate an edit and assign it an id, without applying it.
    pub fn prepare_replace(
        &mut self,
        offset: usize,
        length: usize,
        text: &str,
    ) -> Result<DocumentEvent, ProjectionError> {
        self.check_range(Region::new(offset, length))?;
        let id = EditId(self.next_edit);
        self.next_edit += 1;
        Ok(DocumentEvent {
            id,
            offset,
            length,
            text: text.to_string(),
        })
    }

    /// Apply a prepared edit.
    pub fn commit(&mut self, event: &DocumentEvent) -> Result<(), ProjectionError> {
        let region = event.region();
        self.check_range(region)?;
        if !region.is_empty() {
            self.rope.remove(region.range());
        }
        if !event.text.is_empty() {
            self.rope.insert(region.offset, &event.text);
        }
        self.version += 1;
        Ok(())
    }

    /// Prepare and commit an edit in one step. Projections are not notified.
    pub fn replace(
        &mut self,
        offset: usize,
        length: usize,
        text: &str,
    ) -> Result<DocumentEvent, ProjectionError> {
        let event = self.prepare_replace(offset, length, text)?;
        self.commit(&event)?;
        Ok(event)
    }
}
