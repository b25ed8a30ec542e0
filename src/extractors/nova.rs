//! Extractors for the Nova metadata sub-document.
//!
//! Nova writes a `nova:instance` node under `<metadata>` carrying the display
//! name, flavor, owner, root disk and port/IP assignments. Descriptors of
//! domains not managed by Nova have none of it, and every family here then
//! emits nothing.

use crate::descriptor::{nova, Descriptor, Element, Query};
use crate::error::ExtractionError;
use crate::extractors::{attr_label, Instance, Sample};

/// Flavor child elements, in label order after `flavor_name`.
const FLAVOR_FIELDS: [&str; 5] = ["memory", "disk", "vcpus", "swap", "ephemeral"];

fn nova_child<'a>(parent: &'a Element, name: &str) -> Option<&'a Element> {
    parent.child(nova(name))
}

/// `nova_instance_metadata`: display name, creation time and package version.
pub fn instance_metadata(
    doc: &Descriptor,
    instance: &Instance,
) -> Result<Vec<Sample>, ExtractionError> {
    let Some(node) = doc.nova_instance() else {
        return Ok(Vec::new());
    };
    let (Some(name), Some(created), Some(package)) = (
        nova_child(node, "name"),
        nova_child(node, "creationTime"),
        nova_child(node, "package"),
    ) else {
        return Ok(Vec::new());
    };

    Ok(vec![Sample::info(
        instance,
        [
            name.text_or_empty().to_string(),
            created.text_or_empty().to_string(),
            attr_label(package, "version"),
        ],
    )])
}

/// `nova_flavor_metadata`: emitted only when the flavor name and all five
/// flavor fields are present. Presence is what counts; an element with
/// empty text still satisfies the check and yields an empty label.
pub fn flavor(doc: &Descriptor, instance: &Instance) -> Result<Vec<Sample>, ExtractionError> {
    let Some(flavor) = doc
        .nova_instance()
        .and_then(|node| node.find(&Query::descendant(nova("flavor"))))
    else {
        return Ok(Vec::new());
    };
    let Some(flavor_name) = flavor.attr("name") else {
        return Ok(Vec::new());
    };

    let mut labels = vec![flavor_name.to_string()];
    for field in FLAVOR_FIELDS {
        match nova_child(flavor, field) {
            Some(element) => labels.push(element.text_or_empty().to_string()),
            None => return Ok(Vec::new()),
        }
    }

    Ok(vec![Sample::info(instance, labels)])
}

/// `nova_owner_metadata`: requires both user and project.
pub fn owner(doc: &Descriptor, instance: &Instance) -> Result<Vec<Sample>, ExtractionError> {
    let Some(owner) = doc
        .nova_instance()
        .and_then(|node| node.find(&Query::descendant(nova("owner"))))
    else {
        return Ok(Vec::new());
    };
    let (Some(user), Some(project)) = (nova_child(owner, "user"), nova_child(owner, "project"))
    else {
        return Ok(Vec::new());
    };

    Ok(vec![Sample::info(
        instance,
        [
            user.text_or_empty().to_string(),
            attr_label(user, "uuid"),
            project.text_or_empty().to_string(),
            attr_label(project, "uuid"),
        ],
    )])
}

/// `nova_instance_root_disk`: image or volume backing the root disk.
pub fn root_disk(doc: &Descriptor, instance: &Instance) -> Result<Vec<Sample>, ExtractionError> {
    let Some(root) = doc
        .nova_instance()
        .and_then(|node| nova_child(node, "root"))
    else {
        return Ok(Vec::new());
    };

    Ok(vec![Sample::info(
        instance,
        [attr_label(root, "type"), attr_label(root, "uuid")],
    )])
}

/// `nova_instance_ip`: one sample per IP of every Neutron port.
pub fn ip_assignments(
    doc: &Descriptor,
    instance: &Instance,
) -> Result<Vec<Sample>, ExtractionError> {
    let Some(node) = doc.nova_instance() else {
        return Ok(Vec::new());
    };

    let mut samples = Vec::new();
    for port in node.find_all(&Query::descendant(nova("port"))) {
        let port_uuid = attr_label(port, "uuid");
        for ip in port.find_all(&Query::child(nova("ip"))) {
            samples.push(Sample::info(
                instance,
                [
                    port_uuid.clone(),
                    attr_label(ip, "address"),
                    attr_label(ip, "ipVersion"),
                    attr_label(ip, "type"),
                ],
            ));
        }
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::test_support::{descriptor, instance, tail};

    const FULL: &str = include_str!("../../tests/fixtures/instance-full.xml");

    fn with_nova(body: &str) -> String {
        format!(
            r#"<domain><name>vm</name><metadata>
                 <nova:instance xmlns:nova="http://openstack.org/xmlns/libvirt/nova/1.1">{body}</nova:instance>
               </metadata></domain>"#
        )
    }

    #[test]
    fn test_full_metadata() {
        let doc = descriptor(FULL);
        let inst = instance();

        let meta = instance_metadata(&doc, &inst).unwrap();
        assert_eq!(
            tail(&meta[0]),
            vec!["web-frontend-1", "2024-03-11 09:42:17", "27.1.0"]
        );

        let fl = flavor(&doc, &inst).unwrap();
        assert_eq!(tail(&fl[0]), vec!["m1.medium", "4096", "40", "2", "0", "0"]);
        assert_eq!(fl[0].value, 1.0);

        let own = owner(&doc, &inst).unwrap();
        assert_eq!(
            tail(&own[0]),
            vec![
                "alice",
                "1d5e3c0a9b8f4e2d8c7b6a5f4e3d2c1b",
                "web-team",
                "9a8b7c6d5e4f40312a1b2c3d4e5f6a7b"
            ]
        );

        let root = root_disk(&doc, &inst).unwrap();
        assert_eq!(
            tail(&root[0]),
            vec!["image", "5e0b7c8d-1a2b-4c3d-8e9f-0a1b2c3d4e5f"]
        );

        let ips = ip_assignments(&doc, &inst).unwrap();
        assert_eq!(ips.len(), 2);
        assert_eq!(
            tail(&ips[1]),
            vec!["b1c2d3e4-f5a6-4b7c-8d9e-0f1a2b3c4d5e", "fd00::12", "6", "fixed"]
        );
    }

    #[test]
    fn test_no_metadata_emits_nothing() {
        let doc = descriptor("<domain><name>vm</name><metadata/></domain>");
        let inst = instance();
        assert!(instance_metadata(&doc, &inst).unwrap().is_empty());
        assert!(flavor(&doc, &inst).unwrap().is_empty());
        assert!(owner(&doc, &inst).unwrap().is_empty());
        assert!(root_disk(&doc, &inst).unwrap().is_empty());
        assert!(ip_assignments(&doc, &inst).unwrap().is_empty());
    }

    #[test]
    fn test_partial_flavor_is_suppressed() {
        let doc = descriptor(&with_nova(
            r#"<nova:flavor name="m1.small"><nova:memory>2048</nova:memory><nova:disk>20</nova:disk></nova:flavor>"#,
        ));
        assert!(flavor(&doc, &instance()).unwrap().is_empty());

        let doc = descriptor(&with_nova(
            r#"<nova:flavor><nova:memory>1</nova:memory><nova:disk>1</nova:disk><nova:vcpus>1</nova:vcpus><nova:swap>0</nova:swap><nova:ephemeral>0</nova:ephemeral></nova:flavor>"#,
        ));
        assert!(flavor(&doc, &instance()).unwrap().is_empty(), "flavor name is required");
    }

    #[test]
    fn test_empty_flavor_field_still_emits() {
        let doc = descriptor(&with_nova(
            r#"<nova:flavor name="m1.tiny"><nova:memory>512</nova:memory><nova:disk>1</nova:disk><nova:vcpus>1</nova:vcpus><nova:swap></nova:swap><nova:ephemeral/></nova:flavor>"#,
        ));
        let samples = flavor(&doc, &instance()).unwrap();
        assert_eq!(tail(&samples[0]), vec!["m1.tiny", "512", "1", "1", "", ""]);
    }

    #[test]
    fn test_owner_requires_user_and_project() {
        let doc = descriptor(&with_nova(
            r#"<nova:owner><nova:user uuid="u1">bob</nova:user></nova:owner>"#,
        ));
        assert!(owner(&doc, &instance()).unwrap().is_empty());
    }

    #[test]
    fn test_owner_missing_uuid_defaults() {
        let doc = descriptor(&with_nova(
            r#"<nova:owner><nova:user>bob</nova:user><nova:project uuid="p1">ops</nova:project></nova:owner>"#,
        ));
        let samples = owner(&doc, &instance()).unwrap();
        assert_eq!(tail(&samples[0]), vec!["bob", "unknown", "ops", "p1"]);
    }

    #[test]
    fn test_port_without_ips() {
        let doc = descriptor(&with_nova(
            r#"<nova:ports><nova:port uuid="p"/></nova:ports>"#,
        ));
        assert!(ip_assignments(&doc, &instance()).unwrap().is_empty());
    }
}
