pub mod helpers {
    pub mod bootstrap;
    pub mod logging;
    pub mod signal_handler;
}

/// Single-shot reads of the active network's state: DNS resolvers and Wi-Fi signal.
pub mod network_info;

#[cfg(test)]
pub mod test_utils;
