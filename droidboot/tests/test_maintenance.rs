// Licensed under the Apache-2.0 license

#[cfg(test)]
mod common;

#[cfg(test)]
mod test {
    use crate::common::{setup, TestSetup};
    use droidboot::modem::ProgressEvent;
    use droidboot::platform::RebootTarget;
    use droidboot::{ErrorKind, FlashResult, Reply, Request};
    use std::fs;
    use std::path::Path;

    fn run(setup: &mut TestSetup, name: &str, args: &[&str]) -> FlashResult<Reply> {
        setup.droidboot.dispatch(name, &Request::args(args))
    }

    const PROXY: &str = "service.proxy.enable";
    const COLD_BOOT: &str = "sys.forcecoldboot";

    fn create(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn property(setup: &TestSetup, key: &str) -> Option<String> {
        setup.properties.values.get().get(key).cloned()
    }

    #[test]
    fn test_erase() {
        let mut setup = setup();
        run(&mut setup, "maintenance erase", &["userdata"]).unwrap();
        run(&mut setup, "maintenance erase", &["/cache"]).unwrap();
        let expected = [
            "nuke /data 4000000",
            "format /data",
            "nuke /cache 4000000",
            "format /cache",
        ];
        assert_eq!(setup.volumes.calls.get(), expected);
        let events = setup.observer.events.get();
        assert!(events.contains(&ProgressEvent::Status("ERASE step 1/2...".to_string())));
        assert!(events.contains(&ProgressEvent::Status("ERASE step 2/2...".to_string())));
    }

    #[test]
    fn test_erase_bad_arguments() {
        let mut setup = setup();
        let long = "x".repeat(60);
        for args in [&[][..], &["system", "cache"][..], &[long.as_str()][..]] {
            let err = run(&mut setup, "maintenance erase", args).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
        assert!(setup.volumes.calls.get().is_empty());
    }

    #[test]
    fn test_repart() {
        let mut setup = setup();
        run(&mut setup, "maintenance repart", &[]).unwrap();
        assert_eq!(setup.partitioner.runs.get(), 1);
        let err = run(&mut setup, "maintenance repart", &["now"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(setup.partitioner.runs.get(), 1);
    }

    #[test]
    fn test_dnx_timeout() {
        let mut setup = setup();
        let err = run(&mut setup, "maintenance dnx_timeout", &["--get"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);

        create(&setup.config.dnx_timeout.clone(), "30\n");
        let reply = run(&mut setup, "maintenance dnx_timeout", &["--get"]).unwrap();
        assert_eq!(reply.message.as_deref(), Some("30"));

        run(&mut setup, "maintenance dnx_timeout", &["--set", "120"]).unwrap();
        let stored = fs::read_to_string(&setup.config.dnx_timeout).unwrap();
        assert_eq!(stored, "120");

        let too_long = "1".repeat(20);
        for args in [
            &["--set", too_long.as_str()][..],
            &["--set"][..],
            &["--peek"][..],
        ] {
            let err = run(&mut setup, "maintenance dnx_timeout", args).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
        let stored = fs::read_to_string(&setup.config.dnx_timeout).unwrap();
        assert_eq!(stored, "120");
    }

    #[test]
    fn test_proxy() {
        let mut setup = setup();
        let err = run(&mut setup, "maintenance proxy", &["start"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert!(setup.properties.values.get().is_empty());

        fs::create_dir_all(setup.config.hsi_port.clone()).unwrap();
        run(&mut setup, "maintenance proxy", &["start"]).unwrap();
        assert_eq!(setup.modem.resets.get(), 1);
        assert_eq!(property(&setup, PROXY).as_deref(), Some("1"));

        // Parts with a fourth CPU skip the modem reset
        create(&setup.config.cpu3_node.clone(), "");
        run(&mut setup, "maintenance proxy", &["start"]).unwrap();
        assert_eq!(setup.modem.resets.get(), 1);

        run(&mut setup, "maintenance proxy", &["stop"]).unwrap();
        assert_eq!(property(&setup, PROXY).as_deref(), Some("0"));

        let err = run(&mut setup, "maintenance proxy", &["restart"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_nvm() {
        let mut setup = setup();
        let reply = run(&mut setup, "maintenance nvm", &["apply", "/tmp/nvm.tlv"]).unwrap();
        assert_eq!(reply.message.as_deref(), Some("NVM applied"));
        let reply = run(&mut setup, "maintenance nvm", &["identify"]).unwrap();
        assert_eq!(reply.message.as_deref(), Some("NVM id 42"));
        run(&mut setup, "maintenance nvm", &["applyzip", "/tmp/nvm.zip"]).unwrap();
        assert_eq!(
            setup.nvm.calls.get(),
            vec!["apply /tmp/nvm.tlv", "identify", "applyzip /tmp/nvm.zip"]
        );

        let err = run(&mut setup, "maintenance nvm", &["apply"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_uniqueid() {
        let mut setup = setup();
        let reply = run(&mut setup, "maintenance uniqueid", &[]).unwrap();
        assert_eq!(
            reply.message.as_deref(),
            Some("e0e1e2e3e4e5e6e7e8e9eaebecedeeef\nf0f1f2f3")
        );
    }

    #[test]
    fn test_sysinfo() {
        let mut setup = setup();
        let reply = run(&mut setup, "maintenance sysinfo", &["ifwi"]).unwrap();
        assert_eq!(reply.message.as_deref(), Some("05.00"));

        create(
            &setup.config.default_prop.clone(),
            "ro.secure=1\nro.product.name=redhookbay\n",
        );
        let reply = run(&mut setup, "maintenance sysinfo", &["product"]).unwrap();
        assert_eq!(reply.message.as_deref(), Some("REDHOOKBAY"));

        create(&setup.config.usb_serial.clone(), "MEDFIELD42\n");
        let reply = run(&mut setup, "maintenance sysinfo", &["serial"]).unwrap();
        assert_eq!(reply.message.as_deref(), Some("MEDFIELD42"));

        let err = run(&mut setup, "maintenance sysinfo", &["board"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_reboot_targets() {
        let mut setup = setup();
        run(&mut setup, "maintenance reboot-bootloader", &[]).unwrap();
        assert!(setup.properties.values.get().is_empty());

        run(&mut setup, "maintenance continue", &[]).unwrap();
        assert_eq!(property(&setup, COLD_BOOT).as_deref(), Some("yes"));
        run(&mut setup, "maintenance reboot", &[]).unwrap();

        let expected = [
            RebootTarget::Bootloader,
            RebootTarget::Android,
            RebootTarget::Android,
        ];
        assert_eq!(setup.power.reboots.get(), expected);
        assert_eq!(setup.power.syncs.get(), 3);

        let err = run(&mut setup, "maintenance reboot", &["now"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(setup.power.reboots.get().len(), 3);
    }
}
