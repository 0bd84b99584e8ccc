//! Fuzz target for kind matching through translations.
//!
//! Run with: cargo +nightly fuzz run fuzz_kind_matching
//!
//! Splits the input into three kind names, declares a translation between the
//! first two and checks that matching stays symmetric.

#![no_main]

use ctxmesh_core::component::KindDescription;
use ctxmesh_core::Discoverer;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    let split1 = (data[0] as usize % (data.len() - 2)).max(2);
    let split2 = (data[1] as usize % (data.len() - split1)).max(1) + split1;

    let from = String::from_utf8_lossy(&data[2..split1]);
    let to = String::from_utf8_lossy(&data[split1..split2]);
    let other = String::from_utf8_lossy(&data[split2..]);

    let discoverer = Discoverer::new();
    discoverer.add_translation(
        &KindDescription::new(&*from, "STRING"),
        &KindDescription::new(&*to, "STRING"),
    );

    let a = discoverer.build_context_information(&*from, "STRING", Vec::new());
    let b = discoverer.build_context_information(&*to, "STRING", Vec::new());
    let c = discoverer.build_context_information(&*other, "STRING", Vec::new());

    assert!(a.is_kind_of(&b));
    assert_eq!(a.is_kind_of(&c), c.is_kind_of(&a));
    let _ = a.table_name();
});
