//! Dictionary catalog: directories, files and members.
//!
//! Every dictionary directory carries a `dics.dir` text file with one line
//! per member:
//!
//! ```text
//! #RK-DICS -rw-
//! iroha.cbd(iroha.mwd) -iroha--r--
//! iroha.cbd(iroha.swd) -iroha-sub--r--
//! iroha.cld(iroha.fq) -iroha--rw-
//! user.ctd(user.usr) -user--rw-
//! ```
//!
//! `link` is the file name inside the directory, `member` names the logical
//! dictionary inside that file and `nickname` is what callers mount. The
//! file extension of `link` selects the backend kind, the extension of
//! `member` the word class.
//!
//! Reference counts on members, files and directories are the only sharing
//! mechanism; the catalog is not thread-safe.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{RkError, RkResult};

pub const CATALOG_FILE: &str = "dics.dir";
pub const CATALOG_MAGIC: &str = "#RK-DICS";

static MEMBER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<link>[^\s()]+)\((?P<member>[^\s()]+)\)\s+-(?P<nick>\S+?)-(?P<perm>-[r-][w-]-)?$")
        .unwrap_or_else(|err| panic!("catalog line pattern: {err}"))
});

static MAGIC_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#RK-DICS(?:\s+(?P<perm>-[r-][w-]-))?\s*$")
        .unwrap_or_else(|err| panic!("catalog magic pattern: {err}"))
});

/// Backend kind, from the extension of the file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Permanent,
    Temporary,
    Frequency,
    Grammar,
}

impl MemberKind {
    pub fn from_link(link: &str) -> Option<Self> {
        match extension(link)? {
            "cbd" => Some(MemberKind::Permanent),
            "ctd" => Some(MemberKind::Temporary),
            "cld" => Some(MemberKind::Frequency),
            "cbp" => Some(MemberKind::Grammar),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            MemberKind::Permanent => "cbd",
            MemberKind::Temporary => "ctd",
            MemberKind::Frequency => "cld",
            MemberKind::Grammar => "cbp",
        }
    }

    pub fn is_dictionary(self) -> bool {
        matches!(self, MemberKind::Permanent | MemberKind::Temporary)
    }
}

/// Word class, from the extension of the member name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberClass {
    Main,
    Sub,
    Prefix,
    Suffix,
    Frequency,
    Grammar,
    User,
}

impl MemberClass {
    pub fn from_member(member: &str) -> Self {
        match extension(member) {
            Some("swd") => MemberClass::Sub,
            Some("pre") => MemberClass::Prefix,
            Some("suc") => MemberClass::Suffix,
            Some("fq") => MemberClass::Frequency,
            Some("gram") => MemberClass::Grammar,
            Some("ctd") | Some("usr") => MemberClass::User,
            _ => MemberClass::Main,
        }
    }
}

fn extension(name: &str) -> Option<&str> {
    Path::new(name).extension().and_then(|e| e.to_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permission {
    pub read: bool,
    pub write: bool,
}

impl Permission {
    pub const NONE: Permission = Permission { read: false, write: false };
    pub const READ_ONLY: Permission = Permission { read: true, write: false };
    pub const READ_WRITE: Permission = Permission { read: true, write: true };

    /// Parses `-rw-`, `-r--`, `--w-` or `----`.
    pub fn parse(text: &str) -> Option<Self> {
        let b = text.as_bytes();
        if b.len() != 4 || b[0] != b'-' || b[3] != b'-' {
            return None;
        }
        let read = match b[1] {
            b'r' => true,
            b'-' => false,
            _ => return None,
        };
        let write = match b[2] {
            b'w' => true,
            b'-' => false,
            _ => return None,
        };
        Some(Permission { read, write })
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "-{}{}-",
            if self.read { 'r' } else { '-' },
            if self.write { 'w' } else { '-' }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DicMember {
    pub link: String,
    pub member: String,
    pub nickname: String,
    pub kind: MemberKind,
    pub class: MemberClass,
    pub perm: Permission,
    refs: u32,
}

impl DicMember {
    pub fn refs(&self) -> u32 {
        self.refs
    }

    fn line(&self) -> String {
        format!("{}({}) -{}-{}", self.link, self.member, self.nickname, self.perm)
    }
}

#[derive(Debug)]
enum Line {
    Raw(String),
    Member(usize),
}

#[derive(Debug)]
pub struct DicDirectory {
    path: PathBuf,
    perm: Permission,
    lines: Vec<Line>,
    members: Vec<Option<DicMember>>,
}

impl DicDirectory {
    fn load(path: &Path) -> RkResult<Self> {
        let catalog = path.join(CATALOG_FILE);
        let fs_writable = fs::metadata(path)
            .map(|m| !m.permissions().readonly())
            .map_err(|err| RkError::NotFound(format!("{}: {}", path.display(), err)))?;
        let mut dir = DicDirectory {
            path: path.to_path_buf(),
            perm: Permission {
                read: true,
                write: fs_writable,
            },
            lines: Vec::new(),
            members: Vec::new(),
        };
        let text = match fs::read_to_string(&catalog) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err.into()),
        };
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim_end();
            if let Some(caps) = MAGIC_LINE.captures(line) {
                if let Some(perm) = caps.name("perm").and_then(|p| Permission::parse(p.as_str())) {
                    dir.perm = perm;
                }
                continue;
            }
            if line.is_empty() || line.starts_with('#') {
                dir.lines.push(Line::Raw(line.to_string()));
                continue;
            }
            let Some(caps) = MEMBER_LINE.captures(line) else {
                tracing::warn!("{}:{}: unrecognized catalog line", catalog.display(), lineno + 1);
                dir.lines.push(Line::Raw(line.to_string()));
                continue;
            };
            let link = caps["link"].to_string();
            let Some(kind) = MemberKind::from_link(&link) else {
                tracing::warn!("{}:{}: unknown dictionary type {link}", catalog.display(), lineno + 1);
                dir.lines.push(Line::Raw(line.to_string()));
                continue;
            };
            let member = caps["member"].to_string();
            let perm = caps
                .name("perm")
                .and_then(|p| Permission::parse(p.as_str()))
                .unwrap_or(Permission::READ_ONLY);
            dir.members.push(Some(DicMember {
                class: MemberClass::from_member(&member),
                link,
                member,
                nickname: caps["nick"].to_string(),
                kind,
                perm,
                refs: 0,
            }));
            dir.lines.push(Line::Member(dir.members.len() - 1));
        }
        Ok(dir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn permission(&self) -> Permission {
        self.perm
    }

    pub fn members(&self) -> impl Iterator<Item = &DicMember> {
        self.members.iter().flatten()
    }

    fn to_text(&self) -> String {
        let mut out = format!("{CATALOG_MAGIC} {}\n", self.perm);
        for line in &self.lines {
            match line {
                Line::Raw(text) => out.push_str(text),
                Line::Member(i) => match &self.members[*i] {
                    Some(m) => out.push_str(&m.line()),
                    None => continue,
                },
            }
            out.push('\n');
        }
        out
    }

    /// Rewrites `dics.dir` through `dics.dir.new`.
    fn rewrite(&self) -> RkResult<()> {
        let target = self.path.join(CATALOG_FILE);
        let side = self.path.join(format!("{CATALOG_FILE}.new"));
        fs::write(&side, self.to_text())?;
        fs::rename(&side, &target)?;
        Ok(())
    }

    fn require_writable(&self) -> RkResult<()> {
        if self.perm.write {
            Ok(())
        } else {
            Err(RkError::PermissionDenied(format!(
                "dictionary directory {} is read-only",
                self.path.display()
            )))
        }
    }
}

/// Stable reference to one member of one open directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub dir: usize,
    pub index: usize,
}

#[derive(Debug, Default)]
pub struct Catalog {
    dirs: Vec<DicDirectory>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the directory at `path`, or returns the already open one.
    pub fn open_directory<P: AsRef<Path>>(&mut self, path: P) -> RkResult<usize> {
        let path = path.as_ref();
        if let Some(id) = self.find_directory(path) {
            return Ok(id);
        }
        let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let dir = DicDirectory::load(&key)?;
        tracing::debug!(
            "opened dictionary directory {} ({} members)",
            key.display(),
            dir.members().count()
        );
        self.dirs.push(dir);
        Ok(self.dirs.len() - 1)
    }

    /// Id of the open directory at `path`.
    pub fn find_directory<P: AsRef<Path>>(&self, path: P) -> Option<usize> {
        let path = path.as_ref();
        let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.directories().find(|(_, d)| d.path == key).map(|(id, _)| id)
    }

    pub fn directory(&self, id: usize) -> Option<&DicDirectory> {
        self.dirs.get(id)
    }

    pub fn directories(&self) -> impl Iterator<Item = (usize, &DicDirectory)> {
        self.dirs.iter().enumerate()
    }

    fn dir(&self, id: usize) -> RkResult<&DicDirectory> {
        self.directory(id)
            .ok_or_else(|| RkError::invalid(format!("directory {id} is not open")))
    }

    fn dir_mut(&mut self, id: usize) -> RkResult<&mut DicDirectory> {
        self.dirs
            .get_mut(id)
            .ok_or_else(|| RkError::invalid(format!("directory {id} is not open")))
    }

    pub fn member(&self, r: MemberRef) -> Option<&DicMember> {
        self.directory(r.dir)?.members.get(r.index)?.as_ref()
    }

    fn member_mut(&mut self, r: MemberRef) -> RkResult<&mut DicMember> {
        self.dir_mut(r.dir)?
            .members
            .get_mut(r.index)
            .and_then(Option::as_mut)
            .ok_or_else(|| RkError::NotFound(format!("member {r:?}")))
    }

    /// Full path of the file holding `r`.
    pub fn path_of(&self, r: MemberRef) -> Option<PathBuf> {
        let dir = self.directory(r.dir)?;
        let member = self.member(r)?;
        Some(dir.path.join(&member.link))
    }

    /// First member named `nickname` in directory `dir` whose kind is in
    /// `kinds` (any kind when empty).
    pub fn find_in(&self, dir: usize, nickname: &str, kinds: &[MemberKind]) -> Option<MemberRef> {
        let d = self.directory(dir)?;
        d.members.iter().enumerate().find_map(|(index, m)| {
            let m = m.as_ref()?;
            (m.nickname == nickname && (kinds.is_empty() || kinds.contains(&m.kind)))
                .then_some(MemberRef { dir, index })
        })
    }

    /// Searches every open directory in opening order.
    pub fn find(&self, nickname: &str, kinds: &[MemberKind]) -> Option<MemberRef> {
        self.directories()
            .find_map(|(id, _)| self.find_in(id, nickname, kinds))
    }

    pub fn first_writable(&self) -> Option<usize> {
        self.directories().find(|(_, d)| d.perm.write).map(|(id, _)| id)
    }

    /// Adds a catalog line. The file itself is not created.
    pub fn create_member(
        &mut self,
        dir: usize,
        link: &str,
        member: &str,
        nickname: &str,
        perm: Permission,
    ) -> RkResult<MemberRef> {
        let kind = MemberKind::from_link(link)
            .ok_or_else(|| RkError::invalid(format!("unknown dictionary type {link}")))?;
        if nickname.is_empty() || nickname.chars().any(char::is_whitespace) {
            return Err(RkError::invalid(format!("bad nickname {nickname:?}")));
        }
        if self.find_in(dir, nickname, &[kind]).is_some() {
            return Err(RkError::AlreadyExists(nickname.to_string()));
        }
        let d = self.dir_mut(dir)?;
        d.require_writable()?;
        d.members.push(Some(DicMember {
            link: link.to_string(),
            member: member.to_string(),
            nickname: nickname.to_string(),
            kind,
            class: MemberClass::from_member(member),
            perm,
            refs: 0,
        }));
        let index = d.members.len() - 1;
        d.lines.push(Line::Member(index));
        d.rewrite()?;
        tracing::debug!("created member {link}({member}) as {nickname}");
        Ok(MemberRef { dir, index })
    }

    /// Drops the catalog line of `r` and deletes its file once no other
    /// member lives in it. The directory stays open with an empty catalog;
    /// it is still where new user dictionaries are created.
    pub fn remove_member(&mut self, r: MemberRef) -> RkResult<()> {
        let d = self.dir_mut(r.dir)?;
        d.require_writable()?;
        let m = d
            .members
            .get(r.index)
            .and_then(Option::as_ref)
            .ok_or_else(|| RkError::NotFound(format!("member {r:?}")))?;
        if m.refs > 0 {
            return Err(RkError::Busy(format!("{} is mounted", m.nickname)));
        }
        let link = m.link.clone();
        d.members[r.index] = None;
        d.lines.retain(|l| !matches!(l, Line::Member(i) if *i == r.index));
        d.rewrite()?;
        let shared = d.members().any(|m| m.link == link);
        if !shared {
            let path = d.path.join(&link);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    pub fn rename_member(&mut self, r: MemberRef, nickname: &str) -> RkResult<()> {
        if nickname.is_empty() || nickname.chars().any(char::is_whitespace) {
            return Err(RkError::invalid(format!("bad nickname {nickname:?}")));
        }
        let kind = self
            .member(r)
            .ok_or_else(|| RkError::NotFound(format!("member {r:?}")))?
            .kind;
        if self.find_in(r.dir, nickname, &[kind]).is_some() {
            return Err(RkError::AlreadyExists(nickname.to_string()));
        }
        self.dir(r.dir)?.require_writable()?;
        let m = self.member_mut(r)?;
        if m.refs > 0 {
            return Err(RkError::Busy(format!("{} is mounted", m.nickname)));
        }
        m.nickname = nickname.to_string();
        self.dir(r.dir)?.rewrite()
    }

    pub fn chmod_member(&mut self, r: MemberRef, perm: Permission) -> RkResult<()> {
        self.dir(r.dir)?.require_writable()?;
        self.member_mut(r)?.perm = perm;
        self.dir(r.dir)?.rewrite()
    }

    /// Sets the permission recorded on the catalog's magic line. A
    /// read-only directory refuses member changes but can be made writable
    /// again.
    pub fn chmod_directory(&mut self, dir: usize, perm: Permission) -> RkResult<()> {
        let d = self.dir_mut(dir)?;
        d.perm = perm;
        d.rewrite()
    }

    /// Marks a member as mounted once more.
    pub fn acquire(&mut self, r: MemberRef) -> RkResult<()> {
        self.member_mut(r)?.refs += 1;
        Ok(())
    }

    /// Drops a reference taken by [`Catalog::acquire`].
    pub fn release(&mut self, r: MemberRef) {
        let Ok(m) = self.member_mut(r) else {
            return;
        };
        if m.refs == 0 {
            tracing::error!("member {} released more often than acquired", m.nickname);
            return;
        }
        m.refs -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "#RK-DICS -rw-\n# system dictionaries\niroha.cbd(iroha.mwd) -iroha--r--\niroha.cbd(iroha.swd) -iroha-sub-\nuser.ctd(user.usr) -user--rw-\n";

    fn sample() -> (tempfile::TempDir, Catalog, usize) {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(CATALOG_FILE), SAMPLE).unwrap();
        let mut cat = Catalog::new();
        let id = cat.open_directory(tmp.path()).unwrap();
        (tmp, cat, id)
    }

    #[test]
    fn parses_lines_kinds_and_permissions() {
        let (_tmp, cat, id) = sample();
        let r = cat.find("iroha", &[MemberKind::Permanent]).unwrap();
        let m = cat.member(r).unwrap();
        assert_eq!(m.member, "iroha.mwd");
        assert_eq!(m.class, MemberClass::Main);
        assert_eq!(m.perm, Permission::READ_ONLY);

        let sub = cat.member(cat.find_in(id, "iroha-sub", &[]).unwrap()).unwrap();
        assert_eq!(sub.class, MemberClass::Sub);
        assert_eq!(sub.perm, Permission::READ_ONLY);

        let user = cat.member(cat.find("user", &[]).unwrap()).unwrap();
        assert_eq!(user.kind, MemberKind::Temporary);
        assert_eq!(user.class, MemberClass::User);
        assert_eq!(user.perm, Permission::READ_WRITE);

        assert!(cat.find("iroha", &[MemberKind::Frequency]).is_none());
        assert_eq!(cat.directory(id).unwrap().permission(), Permission::READ_WRITE);
    }

    #[test]
    fn open_is_idempotent() {
        let (tmp, mut cat, id) = sample();
        assert_eq!(cat.open_directory(tmp.path()).unwrap(), id);
    }

    #[test]
    fn create_rename_chmod_remove_rewrite_the_file() {
        let (tmp, mut cat, id) = sample();
        let r = cat
            .create_member(id, "iroha.cld", "iroha.fq", "iroha", Permission::READ_WRITE)
            .unwrap();
        assert!(cat
            .create_member(id, "x.cld", "x.fq", "iroha", Permission::READ_WRITE)
            .is_err());
        cat.rename_member(r, "freq").unwrap();
        cat.chmod_member(r, Permission::READ_ONLY).unwrap();
        let text = fs::read_to_string(tmp.path().join(CATALOG_FILE)).unwrap();
        assert!(text.starts_with("#RK-DICS -rw-\n# system dictionaries\n"));
        assert!(text.contains("iroha.cld(iroha.fq) -freq--r--\n"));
        assert!(text.contains("iroha.cbd(iroha.swd) -iroha-sub--r--\n"));

        fs::write(tmp.path().join("iroha.cld"), b"x").unwrap();
        cat.remove_member(r).unwrap();
        assert!(!tmp.path().join("iroha.cld").exists());
        let text = fs::read_to_string(tmp.path().join(CATALOG_FILE)).unwrap();
        assert!(!text.contains("iroha.cld"));
        assert!(!tmp.path().join("dics.dir.new").exists());

        let mut again = Catalog::new();
        let id2 = again.open_directory(tmp.path()).unwrap();
        assert_eq!(again.directory(id2).unwrap().members().count(), 3);
    }

    #[test]
    fn busy_members_cannot_be_removed() {
        let (_tmp, mut cat, _) = sample();
        let r = cat.find("user", &[]).unwrap();
        cat.acquire(r).unwrap();
        cat.acquire(r).unwrap();
        assert_eq!(cat.member(r).unwrap().refs(), 2);
        assert!(matches!(cat.remove_member(r), Err(RkError::Busy(_))));
        cat.release(r);
        cat.release(r);
        assert_eq!(cat.member(r).unwrap().refs(), 0);
        cat.remove_member(r).unwrap();
        assert!(cat.find("user", &[]).is_none());
    }

    #[test]
    fn read_only_directory_refuses_changes() {
        let (_tmp, mut cat, id) = sample();
        cat.chmod_directory(id, Permission::READ_ONLY).unwrap();
        assert!(matches!(
            cat.create_member(id, "n.ctd", "n.usr", "n", Permission::READ_WRITE),
            Err(RkError::PermissionDenied(_))
        ));
        assert!(cat.first_writable().is_none());
    }

    #[test]
    fn missing_catalog_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cat = Catalog::new();
        let id = cat.open_directory(tmp.path()).unwrap();
        assert_eq!(cat.directory(id).unwrap().members().count(), 0);
        assert_eq!(cat.first_writable(), Some(id));
        assert!(Catalog::new().open_directory(tmp.path().join("absent")).is_err());
    }

    #[test]
    fn permission_text() {
        for text in ["-rw-", "-r--", "--w-", "----"] {
            assert_eq!(Permission::parse(text).unwrap().to_string(), text);
        }
        assert!(Permission::parse("rw").is_none());
    }
}
