/// Whether a backend failure `message` means `repository` does not exist.
///
/// The backend client reports a missing repository by echoing the repository
/// string as the last line of its error output, which the restic store formats as
/// `exit status 1, reason: <repository>`. A line of `message` must equal that
/// sentinel exactly once trimmed; anything else, including near misses, is a
/// genuine failure.
///
/// This matches on the backend CLI's error text, not on a structured code, and
/// breaks if that text changes.
pub fn is_repository_not_found(repository: &str, message: &str) -> bool {
    let sentinel = format!("exit status 1, reason: {repository}");

    message.lines().any(|line| line.trim() == sentinel)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPOSITORY: &str = "s3:s3.amazonaws.com/bucket/r1";

    #[test]
    fn matches_exact_sentinel_line() {
        assert!(is_repository_not_found(
            REPOSITORY,
            "exit status 1, reason: s3:s3.amazonaws.com/bucket/r1"
        ));
    }

    #[test]
    fn matches_sentinel_among_other_lines_after_trimming() {
        let message = "Fatal: unable to open config file: Stat: The specified key does not exist.\n\
                       Is there a repository at the following location?\n   \
                       exit status 1, reason: s3:s3.amazonaws.com/bucket/r1  \n";

        assert!(is_repository_not_found(REPOSITORY, message));
    }

    #[test]
    fn rejects_trailing_characters() {
        assert!(!is_repository_not_found(
            REPOSITORY,
            "exit status 1, reason: s3:s3.amazonaws.com/bucket/r1/extra"
        ));
    }

    #[test]
    fn rejects_sentinel_embedded_in_a_longer_line() {
        assert!(!is_repository_not_found(
            REPOSITORY,
            "BackendCommandFailed: exit status 1, reason: s3:s3.amazonaws.com/bucket/r1"
        ));
    }

    #[test]
    fn rejects_other_exit_codes_and_repositories() {
        assert!(!is_repository_not_found(
            REPOSITORY,
            "exit status 3, reason: s3:s3.amazonaws.com/bucket/r1"
        ));
        assert!(!is_repository_not_found(
            REPOSITORY,
            "exit status 1, reason: s3:s3.amazonaws.com/bucket/r2"
        ));
        assert!(!is_repository_not_found(REPOSITORY, "wrong password or no key found"));
    }
}
