#![no_main]

use fsprobe::params::ParamSet;
use fsprobe::path::FsPath;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // `--param` values arrive straight from the command line
        if let Ok((key, value)) = ParamSet::parse_assignment(input) {
            assert!(!key.is_empty());
            assert!(!key.contains('='));
            let params = ParamSet::new().with(key, value);
            let _ = params.to_assignments();
        }

        let path = FsPath::new(input);
        let _ = (path.scheme(), path.authority(), path.key());
        let _ = path.join("child").key();
    }
});
