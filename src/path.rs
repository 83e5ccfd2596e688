use core::str::FromStr;
use std::fmt;

/// A path inside the volume. Lookups always start at the root directory; the
/// `absolute` flag only records how the path was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePath {
    absolute: bool,

    /// Components of a path not including separators (the `/` character).
    components: Vec<FilePathComponent>,
}

impl FilePath {
    pub const SEPARATOR: char = '/';

    pub fn root() -> Self {
        Self {
            absolute: true,
            components: Vec::new(),
        }
    }

    /// Splits on `/`, dropping empty components, so `//a///b/` is `/a/b`.
    /// Returns `None` only for an empty relative path.
    pub fn parse(s: &str) -> Option<Self> {
        let absolute = s.starts_with(Self::SEPARATOR);
        let components: Vec<FilePathComponent> = s
            .split(Self::SEPARATOR)
            .filter_map(FilePathComponent::new)
            .collect();
        if !absolute && components.is_empty() {
            None
        } else {
            Some(Self {
                absolute,
                components,
            })
        }
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// True for `/`. Lookups of a relative empty path never get this far.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> impl Iterator<Item = &str> + '_ {
        self.components.iter().map(FilePathComponent::as_str)
    }

    /// Last component, or `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        self.components.last().map(FilePathComponent::as_str)
    }

    /// Everything but the last component, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        self.split_dirname_filename().map(|(parent, _)| parent)
    }

    pub fn split_dirname_filename(&self) -> Option<(Self, FilePathComponent)> {
        let (filename, parent) = self.components.split_last()?;
        let parent_path = Self {
            absolute: self.absolute,
            components: parent.to_vec(),
        };
        Some((parent_path, filename.clone()))
    }

    /// Appends `child`. An absolute `child` replaces this path entirely.
    pub fn join(&self, child: &Self) -> Self {
        if child.absolute {
            return child.clone();
        }
        let mut joined = self.clone();
        joined.components.extend(child.components.iter().cloned());
        joined
    }

    /// Lexically resolves `.` and `..`. `..` at the root of an absolute path
    /// stays at the root; leading `..` of a relative path is kept.
    pub fn normalize(&self) -> Self {
        let mut components: Vec<FilePathComponent> = Vec::with_capacity(self.components.len());
        for component in &self.components {
            match component.as_str() {
                "." => {}
                ".." => match components.last().map(FilePathComponent::as_str) {
                    Some(last) if last != ".." => {
                        components.pop();
                    }
                    _ if self.absolute => {}
                    _ => components.push(component.clone()),
                },
                _ => components.push(component.clone()),
            }
        }
        Self {
            absolute: self.absolute,
            components,
        }
    }

    pub fn as_string(&self) -> String {
        self.to_string()
    }
}

/// A component of a file path. Notably, this cannot include the `/` character,
/// and is non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePathComponent(String);

impl FilePathComponent {
    fn new(s: &str) -> Option<Self> {
        if s.is_empty() || s.contains(FilePath::SEPARATOR) {
            None
        } else {
            Some(Self(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilePathComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FilePath {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or("file path is empty")
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            write!(f, "/")?;
        }
        for (i, component) in self.components.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{component}")?;
        }
        Ok(())
    }
}
